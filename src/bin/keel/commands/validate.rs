//! `keel validate` command

use anyhow::{Context, Result};

use crate::cli::ValidateArgs;
use crate::progress::Spinner;
use keel::ops::check::{validate_syntactic, CheckOptions};
use keel::ops::validate::{
    format_combined, format_result_for_output, to_json, validate_runtime, CombinedReport,
    OutputFormat,
};
use keel::util::fs::write_string;
use keel::util::process::find_executable;
use keel::util::GlobalContext;

pub fn execute(args: ValidateArgs, ctx: &GlobalContext) -> Result<()> {
    let output_format: OutputFormat = args
        .output_format
        .parse()
        .with_context(|| format!("invalid output format: {}", args.output_format))?;

    let project = ctx.resolve_path(&args.project);
    let config = &ctx.config().validate;
    let verbose = ctx.is_verbose();

    for command in [config.install_command(), config.build_command(), config.start_command()] {
        if let Some(program) = command.first() {
            if find_executable(program).is_none() {
                tracing::warn!("`{}` not found on PATH", program);
            }
        }
    }

    let endpoints = (!args.endpoints.is_empty()).then_some(args.endpoints.as_slice());
    let show_spinner = output_format == OutputFormat::Human && !verbose;

    let (valid, output, json) = if args.syntactic {
        let check_opts = CheckOptions::from_config(&ctx.config().check, config.stderr_limit());

        let spinner = Spinner::start(format!("Type-checking {}", project.display()), show_spinner);
        let syntactic = validate_syntactic(&project, &check_opts);
        spinner.finish();

        let spinner = Spinner::start(format!("Validating {}", project.display()), show_spinner);
        let runtime = validate_runtime(&project, endpoints, args.base_url.as_deref(), ctx);
        spinner.finish();

        let report = CombinedReport::new(syntactic, runtime);
        (
            report.valid,
            format_combined(&report, output_format, verbose),
            to_json(&report),
        )
    } else {
        let spinner = Spinner::start(format!("Validating {}", project.display()), show_spinner);
        let result = validate_runtime(&project, endpoints, args.base_url.as_deref(), ctx);
        spinner.finish();

        (
            result.valid,
            format_result_for_output(&result, output_format, verbose),
            to_json(&result),
        )
    };

    print!("{}", output);
    if output_format == OutputFormat::Json {
        println!();
    }

    if let Some(ref save) = args.save {
        let path = ctx.resolve_path(save);
        write_string(&path, &json)?;
        tracing::info!("Saved report to {}", path.display());
    }

    // Exit with error code if validation failed
    if !valid {
        std::process::exit(1);
    }

    Ok(())
}
