use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use log::info;

use server::game::GameConstants;
use server::network::Server;

/// Authoritative UDP server for the worms game.
#[derive(Parser, Debug)]
#[command(version, about, disable_help_flag = true)]
struct Args {
    /// UDP port to listen on.
    #[arg(short = 'p', long, default_value_t = 2021, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Seed for the game generator; defaults to the current Unix time.
    #[arg(short = 's', long, value_parser = clap::value_parser!(u32).range(1..))]
    seed: Option<u32>,

    /// Turning speed in degrees per round.
    #[arg(short = 't', long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(1..))]
    turning_speed: u32,

    /// Simulation rounds per second.
    #[arg(short = 'v', long, default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    rounds_per_sec: u32,

    /// Board width in pixels.
    #[arg(short = 'w', long, default_value_t = 640, value_parser = clap::value_parser!(u32).range(1..))]
    width: u32,

    /// Board height in pixels.
    #[arg(short = 'h', long, default_value_t = 480, value_parser = clap::value_parser!(u32).range(1..))]
    height: u32,

    #[arg(long, action = clap::ArgAction::HelpLong)]
    help: Option<bool>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });

    let seed = args.seed.unwrap_or_else(|| {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(1)
    });
    let constants = GameConstants {
        turning_speed: args.turning_speed,
        rounds_per_sec: args.rounds_per_sec,
        width: args.width,
        height: args.height,
    };

    info!(
        "seed {}, {}x{} board, {} rounds/sec, turning speed {}",
        seed, constants.width, constants.height, constants.rounds_per_sec, constants.turning_speed
    );

    let mut server = Server::bind(args.port, seed, constants).await?;
    server.run().await?;
    Ok(())
}
