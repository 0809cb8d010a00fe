// Copyright (c) The junit-annotate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

fn main() {
    junit_annotate::main_impl()
}
