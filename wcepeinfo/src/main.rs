mod report;
#[cfg(test)] mod testutil;


use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use wcepe::{Analysis, ByteSource, FileSource};


/// Shows the PE headers, version information and imports of a Windows CE executable.
#[derive(Parser)]
#[command(version, about, disable_version_flag = true)]
struct Args {
    /// Print version.
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    pub version: Option<bool>,

    /// Output everything as a JSON object.
    #[arg(short, long, conflicts_with_all = ["field", "basic"])]
    pub json: bool,

    /// Output only the value of this field.
    #[arg(short, long)]
    pub field: Option<String>,

    /// Output only the Windows CE application flag, version and architecture.
    #[arg(short, long)]
    pub basic: bool,

    /// Log decoding details to stderr.
    #[arg(short = 'V', long)]
    pub verbose: bool,

    pub file: PathBuf,
}
impl Args {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if let Some(field) = &self.field {
            OutputMode::Field(field.clone())
        } else if self.basic {
            OutputMode::Basic
        } else {
            OutputMode::Text
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum OutputMode {
    Text,
    Basic,
    Field(String),
    Json,
}


#[derive(Debug)]
enum HostError {
    Analysis(wcepe::Error),
    UnknownField(String),
    Output(report::Error),
}
impl HostError {
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(1)
    }
}
impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis(e)
                => write!(f, "failed to analyze image: {}", e),
            Self::UnknownField(name)
                => write!(f, "unknown field {:?}", name),
            Self::Output(e)
                => write!(f, "failed to write output: {}", e),
        }
    }
}
impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Analysis(e) => Some(e),
            Self::UnknownField(_) => None,
            Self::Output(e) => Some(e),
        }
    }
}
impl From<wcepe::Error> for HostError {
    fn from(value: wcepe::Error) -> Self { Self::Analysis(value) }
}
impl From<report::Error> for HostError {
    fn from(value: report::Error) -> Self { Self::Output(value) }
}
impl From<io::Error> for HostError {
    fn from(value: io::Error) -> Self { Self::Output(report::Error::Io(value)) }
}


fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .from_env_lossy()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}


fn write_report<W: Write>(analysis: &Analysis, mode: &OutputMode, out: &mut W) -> Result<(), HostError> {
    match mode {
        OutputMode::Text => {
            report::write_text(&report::all_fields(analysis), out)?;
        },
        OutputMode::Basic => {
            report::write_text(&report::basic_fields(&analysis.ce_classification()), out)?;
        },
        OutputMode::Field(name) => {
            let fields = report::all_fields(analysis);
            let field = report::find_field(&fields, name)
                .ok_or_else(|| HostError::UnknownField(name.clone()))?;
            report::write_bare_value(field, out)?;
        },
        OutputMode::Json => {
            report::write_json(&report::all_fields(analysis), out)?;
        },
    }
    Ok(())
}

fn run<S: ByteSource + ?Sized, W: Write>(source: &S, mode: &OutputMode, out: &mut W) -> Result<(), HostError> {
    let analysis = wcepe::analyze(source)?;
    debug!("analyzed image of {} bytes", source.len());
    write_report(&analysis, mode, out)?;
    out.flush()?;
    Ok(())
}


fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = FileSource::open(&args.file)
        .map_err(HostError::from)
        .and_then(|source| {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            run(&source, &args.output_mode(), &mut out)
        });
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {}", args.file.display(), e);
            e.exit_code()
        },
    }
}
