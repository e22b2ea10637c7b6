//! The completions command

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::RbupResult;
use clap::CommandFactory;
use clap_complete::generate;

pub async fn execute(args: CompletionsArgs) -> RbupResult<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "rbup", &mut std::io::stdout());
    Ok(())
}
