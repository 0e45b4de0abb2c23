//! Frameweave command line: target inspection and entry shim generation.

use clap::{Parser, Subcommand};
use frameweave::llvm::build_entry_shim;
use frameweave::{CompileError, CompileResult, CompilerOptions, TargetSpec};
use inkwell::context::Context;
use std::path::PathBuf;
use std::process::ExitCode;

/// Code generation core for deferred calls and native entry points
#[derive(Parser, Debug)]
#[command(name = "frameweave")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve a target triple and print what it maps to
    Target {
        /// Triple such as x86_64-unknown-linux-gnu, or the pnacl alias
        #[arg(value_name = "TRIPLE")]
        triple: String,
    },

    /// Emit a module holding only the native main for an external main.main
    EntryShim {
        /// Target triple (defaults to the host)
        #[arg(short, long)]
        triple: Option<String>,

        /// Write IR here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let result = match args.command {
        Commands::Target { triple } => describe_target(&triple),
        Commands::EntryShim { triple, output } => entry_shim(triple, output),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("frameweave: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn describe_target(triple: &str) -> CompileResult<()> {
    let target = TargetSpec::resolve(triple)?;
    println!("triple:      {}", target.triple());
    println!("arch:        {}", target.arch());
    println!("target:      {}", target.target_name());
    println!("data layout: {}", target.data_layout());
    println!("sandboxed:   {}", target.rewritten_from_alias());
    Ok(())
}

fn entry_shim(triple: Option<String>, output: Option<PathBuf>) -> CompileResult<()> {
    let options = match triple {
        Some(triple) => CompilerOptions::new(triple),
        None => CompilerOptions::default(),
    };
    let target = TargetSpec::resolve(&options.target_triple)?;
    let context = Context::create();
    let module = build_entry_shim(&context, &target, &options)?;

    if options.verify_module {
        module.verify().map_err(|message| CompileError::Verification {
            reason: message.to_string(),
        })?;
    }

    match output {
        Some(path) => module.print_to_file(&path).map_err(|message| {
            CompileError::internal(format!("{}: {}", path.display(), message))
        }),
        None => {
            print!("{}", module.print_to_string().to_string());
            Ok(())
        }
    }
}
