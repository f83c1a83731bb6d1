//! memperf CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mp_degrade::{
    AnalysisConfig, Analyzer, Channel, JsonLinesSink, JsonLinesSource, RecordLayout,
    RunLumiEventSelector, SynthConfig, SyntheticEvents, ToyMassEngine,
};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "memperf")]
#[command(about = "memperf - MEM performance studies with degraded truth")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ChannelArg {
    Dilepton,
    SingleLepton,
}

impl From<ChannelArg> for Channel {
    fn from(c: ChannelArg) -> Self {
        match c {
            ChannelArg::Dilepton => Channel::Dilepton,
            ChannelArg::SingleLepton => Channel::SingleLepton,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Degrade generator truth, build hypothesis variants and score them
    Run {
        /// Analysis configuration (YAML, or JSON by extension). Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Generator events (JSON lines)
        #[arg(short, long)]
        input: PathBuf,

        /// Directory receiving one `<variant>.jsonl` file per variant kind
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Run summary (pretty JSON). Defaults to stdout.
        #[arg(long)]
        summary: Option<PathBuf>,

        /// Override `run.seed`
        #[arg(long)]
        seed: Option<u64>,

        /// Override `run.skip_sel_events`
        #[arg(long)]
        skip_sel_events: Option<u64>,

        /// Override `run.max_sel_events`
        #[arg(long)]
        max_sel_events: Option<u64>,

        /// Override `run.max_events`
        #[arg(long)]
        max_events: Option<u64>,

        /// Only process the `run:ls:event` triples listed in this file
        #[arg(long)]
        allow_list: Option<PathBuf>,

        /// Write `run:ls:event` of every recorded event to this file
        #[arg(long)]
        selected_events: Option<PathBuf>,

        /// Log every rejection and selected event (implies debug logging)
        #[arg(long)]
        verbose: bool,
    },

    /// Write synthetic generator events as JSON lines
    Generate {
        #[arg(long, value_enum, default_value = "dilepton")]
        channel: ChannelArg,

        /// Generate the signal decay chain instead of background
        #[arg(long)]
        signal: bool,

        /// Number of events
        #[arg(short = 'n', long, default_value = "1000")]
        events: usize,

        #[arg(long, default_value = "1")]
        seed: u64,

        /// Additional gluon jets per event
        #[arg(long, default_value = "3")]
        extra_jets: usize,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate an analysis configuration and print it with defaults filled in
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let level = if verbose { cli.log_level.max(tracing::Level::DEBUG) } else { cli.log_level };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    match cli.command {
        Commands::Run {
            config,
            input,
            output_dir,
            summary,
            seed,
            skip_sel_events,
            max_sel_events,
            max_events,
            allow_list,
            selected_events,
            verbose,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                cfg.run.seed = seed;
            }
            if let Some(n) = skip_sel_events {
                cfg.run.skip_sel_events = n;
            }
            if max_sel_events.is_some() {
                cfg.run.max_sel_events = max_sel_events;
            }
            if max_events.is_some() {
                cfg.run.max_events = max_events;
            }
            cfg.verbose |= verbose;
            cmd_run(
                &cfg,
                &input,
                &output_dir,
                summary.as_deref(),
                allow_list.as_deref(),
                selected_events.as_deref(),
            )
        }
        Commands::Generate { channel, signal, events, seed, extra_jets, output } => {
            let synth = SynthConfig {
                channel: channel.into(),
                signal,
                extra_jets,
                seed,
                ..SynthConfig::default()
            };
            cmd_generate(synth, events, output.as_deref())
        }
        Commands::Validate { config } => {
            let cfg = load_config(Some(&config))?;
            println!("{}", serde_json::to_string_pretty(&cfg)?);
            Ok(())
        }
        Commands::Version => {
            println!("memperf {}", mp_core::VERSION);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading configuration");
            AnalysisConfig::from_path(path)
                .with_context(|| format!("invalid configuration {}", path.display()))
        }
        None => {
            let cfg = AnalysisConfig::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }
}

fn cmd_run(
    cfg: &AnalysisConfig,
    input: &Path,
    output_dir: &Path,
    summary: Option<&Path>,
    allow_list: Option<&Path>,
    selected_events: Option<&Path>,
) -> Result<()> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("cannot open {}", input.display()))?,
    );
    let events = JsonLinesSource::new(reader);

    let mut sink = JsonLinesSink::create(output_dir, RecordLayout::for_channel(cfg.channel))?;
    let mut engine = ToyMassEngine::new(cfg.smearing.jet.coeff);

    let mut analyzer = Analyzer::new(cfg)?;
    if let Some(path) = allow_list {
        let selector = RunLumiEventSelector::from_path(path)?;
        tracing::info!(entries = selector.len(), "allow-list loaded");
        analyzer = analyzer.with_allow_list(selector);
    }
    if let Some(path) = selected_events {
        let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
        analyzer = analyzer.with_selected_events_writer(BufWriter::new(file));
    }

    let result = analyzer.run(events, &mut engine, &mut sink)?;
    tracing::info!(
        analyzed = result.analyzed,
        skipped = result.skipped,
        selected = result.selected,
        "run complete"
    );
    tracing::info!("cut flow\n{}", result.cut_flow);

    write_json(summary, serde_json::to_value(&result)?)
}

fn cmd_generate(synth: SynthConfig, events: usize, output: Option<&Path>) -> Result<()> {
    let out: Box<dyn Write> = match output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut out = BufWriter::new(out);
    for event in SyntheticEvents::new(synth).take(events) {
        serde_json::to_writer(&mut out, &event)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

fn write_json(output: Option<&Path>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
