use std::{
    error::Error,
    fs::File,
    io::{self, BufReader, BufWriter, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{ArgAction, Parser};
use eitasm::{Asm, Config, Format, Ins};
use tracing::Level;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Assembly source file
    source: PathBuf,

    /// Output file
    #[arg(short, long, default_value = "out.bin")]
    output: PathBuf,

    /// Output format: `hex` (`x`) or `bin` (`b`)
    #[arg(short, long, default_value_t = Format::Hex)]
    format: Format,

    /// Print the program summary (-v), declared labels (-vv) and raw tokens (-vvv)
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,

    /// TOML file overriding the instruction opcodes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pre-defined symbols (repeatable)
    #[arg(short = 'D', long, value_name = "KEY1=val", value_parser = eitasm::parse_define)]
    define: Vec<(String, u64)>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(short, long, default_value_t = Level::INFO)]
    log_level: Level,
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let input = args.source.display().to_string();
    let file = File::open(&args.source).map_err(|e| format!("cant open file {input}: {e}"))?;

    let mut asm = Asm::new(&input, config.opcodes, args.format).with_verbosity(args.verbose);
    for (name, value) in &args.define {
        asm.define(name, *value)?;
    }
    asm.collect(BufReader::new(file))?;
    asm.rewind();
    asm.emit()?;
    let assembly = asm.finish();

    if args.verbose > 0 {
        summary(&mut io::stdout().lock(), &assembly.listing)?;
    }

    tracing::trace!("writing {}", args.output.display());
    let mut output = BufWriter::new(
        File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&args.output)
            .map_err(|e| format!("cant open file {}: {e}", args.output.display()))?,
    );
    output.write_all(&assembly.data)?;
    output.flush()?;

    tracing::debug!("labels: {}", assembly.labels.len());
    tracing::debug!("words: {}", assembly.words);
    Ok(())
}

fn summary(out: &mut impl Write, listing: &[Ins<'_>]) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Program summary:")?;
    writeln!(out, "| INS  | DEST | DATA | HEX  | ADDR |")?;
    for ins in listing {
        let [hi, lo] = ins.word.pack();
        writeln!(
            out,
            "| {:<4} | {:>4} | {:>4} | {hi:02X}{lo:02X} | {:#04X} |",
            ins.mne.name(),
            ins.word.dst,
            ins.word.data,
            ins.addr,
        )?;
    }
    Ok(())
}
