//! `keel check-batch` command

use anyhow::{Context, Result};

use crate::cli::CheckBatchArgs;
use keel::ops::check::{check_batch, CheckOptions};
use keel::ops::validate::{format_batch, to_json, OutputFormat};
use keel::util::fs::write_string;
use keel::util::GlobalContext;

pub fn execute(args: CheckBatchArgs, ctx: &GlobalContext) -> Result<()> {
    let output_format: OutputFormat = args
        .output_format
        .parse()
        .with_context(|| format!("invalid output format: {}", args.output_format))?;

    let check = &ctx.config().check;
    let pattern = args
        .pattern
        .unwrap_or_else(|| check.batch_pattern().to_string());
    let opts = CheckOptions {
        skip_compilation: args.skip_compilation,
        ..CheckOptions::from_config(check, ctx.config().validate.stderr_limit())
    };

    let base = ctx.resolve_path(&args.base);
    let report = check_batch(&base, &pattern, &opts, args.jobs)
        .with_context(|| format!("failed to check projects under {}", base.display()))?;

    match output_format {
        OutputFormat::Json => println!("{}", to_json(&report)),
        _ => print!("{}", format_batch(&report)),
    }

    if let Some(ref save) = args.save {
        let path = ctx.resolve_path(save);
        write_string(&path, &to_json(&report))?;
        tracing::info!("Saved report to {}", path.display());
    }

    if report.summary.valid_count < report.summary.total_count {
        std::process::exit(1);
    }

    Ok(())
}
