use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use sprk_graph::{EngineConfig, GraphInspection, GraphSummary, WriterConfig};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Inspect(args) => cmd_inspect(args, &cli.format),
        Command::Verify(args) => cmd_verify(args, &cli.format),
        Command::Transcode(args) => cmd_transcode(args, &cli.format),
        Command::Config(args) => cmd_config(args),
    }
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn cmd_inspect(args: InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut input = open(&args.path)?;
    let mut graphs = Vec::new();
    loop {
        let inspection = sprk_graph::inspect(&mut input)
            .with_context(|| format!("failed to inspect {}", args.path.display()))?;
        let more = inspection.trailing_bytes > 0;
        graphs.push(inspection);
        if !args.all || !more {
            break;
        }
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graphs)?),
        OutputFormat::Text => {
            for inspection in &graphs {
                print_inspection(inspection);
            }
        }
    }
    Ok(())
}

fn print_inspection(inspection: &GraphInspection) {
    let header = &inspection.header;
    println!(
        "{} graph at offset {} ({} bytes)",
        "SPRK".cyan().bold(),
        inspection.graph_start,
        inspection.total_len
    );
    println!("  Version: {}", header.version);
    println!("  Mode: {}", header.mode.to_string().yellow());
    if header.compressed {
        println!(
            "  Compression: {} ({} -> {} bytes)",
            "zstd".green(),
            header.uncompressed_len(),
            header.compressed_size
        );
    } else {
        println!("  Compression: {}", "none".dimmed());
    }
    println!(
        "  Shared block: {} bytes, {} objects",
        header.shared_size,
        inspection.shared.len()
    );
    for entry in &inspection.shared {
        println!(
            "    [{}] {} at {} ({} bytes)",
            entry.index,
            entry.type_key.to_string().yellow(),
            entry.offset,
            entry.size
        );
    }
    println!("  Primary block: {} bytes", header.primary_size);
    println!("  Root: {}", inspection.root_type.to_string().yellow().bold());
    if inspection.trailing_bytes > 0 {
        println!("  Followed by {} more bytes", inspection.trailing_bytes);
    }
}

fn cmd_verify(args: VerifyArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let mut failed = 0usize;
    let mut report = Vec::new();

    for path in &args.paths {
        let result = open(path).and_then(|input| Ok(sprk_graph::verify(input)?));
        match (&result, format) {
            (Ok(inspection), OutputFormat::Text) => println!(
                "{} {} ({} shared objects, root {})",
                "✓".green().bold(),
                path.display(),
                inspection.shared.len(),
                inspection.root_type.to_string().yellow()
            ),
            (Err(e), OutputFormat::Text) => {
                println!("{} {}: {}", "✗".red().bold(), path.display(), format!("{e:#}").red())
            }
            (Ok(inspection), OutputFormat::Json) => report.push(serde_json::json!({
                "path": path.display().to_string(),
                "ok": true,
                "shared_objects": inspection.shared.len(),
                "root_type": inspection.root_type,
            })),
            (Err(e), OutputFormat::Json) => report.push(serde_json::json!({
                "path": path.display().to_string(),
                "ok": false,
                "error": format!("{e:#}"),
            })),
        }
        if result.is_err() {
            failed += 1;
        }
    }

    if matches!(format, OutputFormat::Json) {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} files failed verification", args.paths.len());
    }
    Ok(())
}

fn writer_config(args: &TranscodeArgs) -> anyhow::Result<WriterConfig> {
    let mut config = load_config(args.config.as_deref())?.writer;
    if let Some(level) = args.level {
        config.compression_level = level;
        config.compression = true;
    }
    if args.compress {
        config.compression = true;
    }
    if args.no_compress {
        config.compression = false;
    }
    config.validate()?;
    Ok(config)
}

fn cmd_transcode(args: TranscodeArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let config = writer_config(&args)?;
    let mut input = open(&args.input)?;
    let input_len = input.seek(SeekFrom::End(0))?;
    input.seek(SeekFrom::Start(0))?;

    let file = File::create(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;
    let mut output = BufWriter::new(file);

    let mut graphs: Vec<GraphSummary> = Vec::new();
    while input.stream_position()? < input_len {
        let summary = sprk_graph::transcode(&mut input, &mut output, &config).with_context(|| {
            format!("failed to transcode graph {} of {}", graphs.len(), args.input.display())
        })?;
        debug!(graph = graphs.len(), bytes = summary.total_len(), "transcoded graph");
        graphs.push(summary);
    }
    output.flush()?;
    let output_len: u64 = graphs.iter().map(GraphSummary::total_len).sum();

    match format {
        OutputFormat::Json => {
            let value = serde_json::json!({
                "input": args.input.display().to_string(),
                "output": args.output.display().to_string(),
                "graphs": graphs.len(),
                "compressed": config.compression,
                "input_bytes": input_len,
                "output_bytes": output_len,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Text => {
            let mode = if config.compression {
                format!("zstd level {}", config.compression_level)
            } else {
                "uncompressed".to_string()
            };
            println!(
                "{} Transcoded {} graph(s) to {} ({})",
                "✓".green().bold(),
                graphs.len(),
                args.output.display().to_string().bold(),
                mode.cyan()
            );
            println!("  {} -> {} bytes", input_len, output_len);
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}
