//! `keel check` command

use anyhow::{Context, Result};

use crate::cli::CheckArgs;
use crate::progress::Spinner;
use keel::ops::check::{validate_syntactic, CheckOptions};
use keel::ops::validate::{format_syntactic_for_output, OutputFormat};
use keel::util::GlobalContext;

pub fn execute(args: CheckArgs, ctx: &GlobalContext) -> Result<()> {
    let output_format: OutputFormat = args
        .output_format
        .parse()
        .with_context(|| format!("invalid output format: {}", args.output_format))?;

    let opts = CheckOptions {
        skip_compilation: args.skip_compilation,
        ..CheckOptions::from_config(&ctx.config().check, ctx.config().validate.stderr_limit())
    };
    let project = ctx.resolve_path(&args.project);

    let spinner = Spinner::start(
        format!("Type-checking {}", project.display()),
        output_format == OutputFormat::Human && !ctx.is_verbose(),
    );
    let report = validate_syntactic(&project, &opts);
    spinner.finish();

    if output_format == OutputFormat::Human {
        println!("{}", project.display());
    }
    print!("{}", format_syntactic_for_output(&report, output_format, ctx.is_verbose()));
    if output_format == OutputFormat::Json {
        println!();
    }

    if !report.valid {
        std::process::exit(1);
    }

    Ok(())
}
