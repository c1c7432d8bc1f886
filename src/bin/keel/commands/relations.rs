//! `keel relations` command

use anyhow::{bail, Context, Result};

use crate::cli::RelationsArgs;
use keel::ops::relations::{format_report, resolve_blueprint_file, write_enriched};
use keel::ops::validate::{to_json, OutputFormat};
use keel::util::GlobalContext;

pub fn execute(args: RelationsArgs, ctx: &GlobalContext) -> Result<()> {
    let output_format: OutputFormat = args
        .output_format
        .parse()
        .with_context(|| format!("invalid output format: {}", args.output_format))?;

    let path = ctx.resolve_path(&args.blueprint);
    let report = resolve_blueprint_file(&path)?;

    match output_format {
        OutputFormat::Json => println!("{}", to_json(&report)),
        _ => print!("{}", format_report(&report, ctx.use_color())),
    }

    if let Some(ref out) = args.write {
        write_enriched(&report, &ctx.resolve_path(out))?;
    }

    if args.strict && !report.is_clean() {
        bail!(
            "{} relation declarations were dropped or replaced",
            report.diagnostics.len()
        );
    }

    Ok(())
}
