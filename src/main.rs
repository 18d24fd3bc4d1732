use anyhow::Result;
use clap::Parser;

use snirf2nwb::cli::Args;
use snirf2nwb::driver;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snirf2nwb=info".into()),
        )
        .init();

    let args = Args::parse();

    println!("SNIRF to NWB Converter");
    println!("======================");
    println!();
    println!("\tDataset root:\t{}", args.dataset_root.display());
    println!("\tOutput root:\t{}", args.output_root.display());
    println!();

    let report = driver::convert_dataset(&args.dataset_root, &args.output_root)?;

    for outcome in &report.outcomes {
        match (&outcome.output, &outcome.failure) {
            (Some(output), _) => {
                println!("\t[ok]   {}\t{}", outcome.subject, output.display());
            }
            (None, Some((kind, message))) => {
                println!("\t[{kind}] {}\t{message}", outcome.subject);
            }
            (None, None) => {}
        }
    }
    println!();
    println!(
        "Converted {} of {} subject sessions",
        report.converted(),
        report.outcomes.len()
    );

    if report.failed() > 0 {
        anyhow::bail!("{} subject sessions failed to convert", report.failed());
    }
    Ok(())
}
