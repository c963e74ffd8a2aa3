///! map2dif command line

use std::path::PathBuf;
use clap::Parser;
use map2dif::config::{CompileConfig, DetailMode, QuakeVersion};

/// Torque .map to .dif interior converter
#[derive(Parser, Debug)]
#[command(name = "map2dif", version, about, disable_help_flag = true)]
struct Cli {
    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Use 1e-5 point/plane welding precision
    #[arg(short = 'p')]
    precise: bool,

    /// Process only the detail level named on the command line
    #[arg(short = 'd')]
    specified_only: bool,

    /// Process as a low detail shape (implies -s)
    #[arg(short = 'l')]
    low_detail: bool,

    /// Final build: exhaustive BSP split search
    #[arg(short = 'h')]
    final_build: bool,

    /// Don't search for textures in the parent directory
    #[arg(short = 's')]
    no_texture_search: bool,

    /// Noisy error/statistic reporting
    #[arg(short = 'n')]
    verbose: bool,

    /// Quake map file version (2 or 3)
    #[arg(short = 'q', value_name = "VER", default_value_t = 2)]
    quake_version: u32,

    /// Directory the .dif file is placed in
    #[arg(short = 'o', value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Location of textures
    #[arg(short = 't', value_name = "DIR")]
    texture_dir: Option<PathBuf>,

    /// Map file
    #[arg(value_name = "FILE.map")]
    map: PathBuf,
}

impl Cli {
    fn config(&self) -> Result<CompileConfig, String> {
        let quake_version = QuakeVersion::try_from(self.quake_version)
            .map_err(|version| format!("unsupported quake map version {}", version))?;

        let mut config = CompileConfig {
            quake_version,
            texture_dir: self.texture_dir.clone(),
            output_dir: self.output_dir.clone(),
            texture_search: !self.no_texture_search,
            verbose: self.verbose,
            detail_mode: match (self.low_detail, self.specified_only) {
                (true, _) => DetailMode::LowDetail,
                (false, true) => DetailMode::SpecifiedOnly,
                (false, false) => DetailMode::Sequence,
            },
            ..Default::default()
        };

        if self.precise {
            config = config.with_precision();
        }
        if self.final_build {
            config = config.with_final_build();
        }

        Ok(config)
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(match cli.verbose {
        true => "debug",
        false => "info",
    }))
    .format_timestamp(None)
    .init();

    let config = match cli.config() {
        Ok(config) => config,
        Err(message) => {
            log::error!("{}", message);
            return std::process::ExitCode::FAILURE;
        }
    };

    let is_map = cli.map
        .extension()
        .and_then(|extension| extension.to_str())
        .map_or(false, |extension| extension.eq_ignore_ascii_case("map"));
    if !is_map {
        log::error!("the map file must have a .map extension");
        return std::process::ExitCode::FAILURE;
    }

    match map2dif::compiler::run(&cli.map, &config) {
        Ok(0) => std::process::ExitCode::SUCCESS,
        Ok(failures) => {
            log::error!("{} map files failed to compile", failures);
            std::process::ExitCode::FAILURE
        }
        Err(error) => {
            log::error!("{}", error);
            std::process::ExitCode::FAILURE
        }
    }
}

// main.rs
