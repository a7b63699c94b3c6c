use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use shaderfront::compiler::{cache::write_atomic, Backend, CompileOptions, Compiler, Stage};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Inputs {
    #[arg()]
    input: PathBuf,
    /// Additional include directory, searched first.
    #[arg(short = 'I', long = "include")]
    include_dirs: Vec<PathBuf>,
    /// Name defined before preprocessing starts.
    #[arg(short = 'D', long = "define")]
    defines: Vec<String>,
}
impl Inputs {
    fn compiler(&self) -> Compiler {
        Compiler::new(CompileOptions {
            include_dirs: self.include_dirs.clone(),
            defines: self.defines.clone(),
        })
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the preprocessed source.
    Preprocess {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the binding model and permutations as JSON.
    Model {
        #[command(flatten)]
        inputs: Inputs,
        /// Overrides the stage derived from the file name.
        #[arg(long, value_enum)]
        stage: Option<Stage>,
    },
    /// Write the source with registers assigned, plus a `.rs` root signature.
    Bind {
        #[command(flatten)]
        inputs: Inputs,
        #[arg(long, value_enum)]
        backend: Backend,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, value_enum)]
        stage: Option<Stage>,
    },
}

fn emit(output: Option<&PathBuf>, bytes: &[u8]) -> Result<()> {
    match output {
        Some(path) => write_atomic(path, bytes),
        None => {
            io::stdout().write_all(bytes)?;
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Arguments::parse();
    match args.command {
        Command::Preprocess { inputs, output } => {
            let text = inputs.compiler().preprocess(&inputs.input)?;
            emit(output.as_ref(), text.as_bytes())?;
        }
        Command::Model { inputs, stage } => {
            let model = inputs.compiler().binding_model(&inputs.input, stage)?;
            let mut json = serde_json::to_string_pretty(&model)?;
            json.push('\n');
            emit(None, json.as_bytes())?;
        }
        Command::Bind {
            inputs,
            backend,
            output,
            stage,
        } => {
            let bound = inputs.compiler().bind(&inputs.input, backend, stage)?;
            write_atomic(&output, bound.source.as_bytes())?;
            let mut rootsig = output.clone().into_os_string();
            rootsig.push(".rs");
            write_atomic(&PathBuf::from(rootsig), bound.root_signature.as_bytes())?;
        }
    }
    Ok(())
}
