// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `rc completions <shell>`
//!
//! ```bash
//! rc completions bash > ~/.local/share/bash-completion/completions/rc
//! rc completions zsh > ~/.zfunc/_rc
//! ```

use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;

#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn write_completions<C: CommandFactory>(shell: Shell, out: &mut dyn Write) {
    clap_complete::generate(shell, &mut C::command(), "rc", out);
}
