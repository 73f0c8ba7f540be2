use anyhow::Result;
use clap::Parser;
use xssh_cli::{
    cli::{ForwardArgs, ForwardPlan},
    init_tracing, run,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = ForwardArgs::parse();
    init_tracing(args.verbosity());
    let plan = ForwardPlan::try_from(args)?;
    run(plan).await
}
