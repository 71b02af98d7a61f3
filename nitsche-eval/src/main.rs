use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde::Serialize;

use nitsche::scene::SceneConfig;
use nitsche::ContactPressure;

const ABOUT: &str = "
Solves frictionless contact between two plane elastic blocks with a Nitsche method and a \
gap measured on the deformed configuration.";

#[derive(Parser)]
#[clap(author, about = ABOUT, name = "nitsche")]
struct Opt {
    /// Path to the problem configuration file in `ron` format.
    #[clap(name = "CONFIG", parse(from_os_str))]
    config: PathBuf,

    /// Output `json` file for the solution.
    ///
    /// The report is written to standard output if no file is given.
    #[clap(name = "OUTPUT", parse(from_os_str))]
    output: Option<PathBuf>,

    /// Log file path.
    #[clap(short, long, parse(from_os_str))]
    logfile: Option<PathBuf>,

    /// Write the default configuration to CONFIG and exit.
    #[clap(long)]
    write_default: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    converged: bool,
    iterations: u32,
    linear_iterations: u32,
    elapsed_seconds: f64,
    residual_history: &'a [f64],
    displacement: &'a [f64],
    contact_pressure: &'a [ContactPressure],
}

pub fn main() {
    if let Err(err) = try_main() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

pub fn try_main() -> Result<()> {
    let _ = env_logger::Builder::from_env("NITSCHE_LOG").try_init();

    let opt = Opt::parse();

    if opt.write_default {
        SceneConfig::default().save(&opt.config)?;
        return Ok(());
    }

    match opt.config.extension().and_then(|x| x.to_str()) {
        Some("ron") => {}
        Some(ext) => anyhow::bail!("Unsupported config extension: '.{}'", ext),
        None => anyhow::bail!(
            "Missing file extension in config path: {}",
            opt.config.display()
        ),
    }

    // Pre-emptively create the log file. This way we can fail early.
    if let Some(logfile) = opt.logfile.as_ref() {
        let _ = std::fs::File::create(logfile)?;
    }

    let config = SceneConfig::load(&opt.config)?;

    // Write the config so we know how the following log was created.
    if let Some(logfile) = opt.logfile.as_ref() {
        let f = std::fs::File::options().append(true).open(logfile)?;
        let mut buf = std::io::BufWriter::new(f);
        writeln!(buf, "Config:\n")?;
        config.write_as_ron(&mut buf)?;
        writeln!(buf)?;
    }

    let solution = config.run()?;
    log::info!("{}", solution.timings);

    if let Some(logfile) = opt.logfile.as_ref() {
        let mut f = std::fs::File::options().append(true).open(logfile)?;
        writeln!(f, "\n{}\n\n{}", solution, solution.timings)?;
    }

    let report = Report {
        converged: solution.converged,
        iterations: solution.iterations,
        linear_iterations: solution.linear_iterations,
        elapsed_seconds: solution.elapsed.as_secs_f64(),
        residual_history: &solution.residual_history,
        displacement: &solution.displacement,
        contact_pressure: &solution.contact_pressure,
    };

    match opt.output {
        Some(path) => {
            let f = std::io::BufWriter::new(std::fs::File::create(path)?);
            serde_json::to_writer_pretty(f, &report)?;
        }
        None => {
            let stdout = std::io::stdout();
            let mut lock = stdout.lock();
            serde_json::to_writer_pretty(&mut lock, &report)?;
            writeln!(lock)?;
        }
    }
    eprintln!("{}", solution);
    Ok(())
}
