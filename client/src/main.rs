use clap::Parser;
use log::info;

use client::network::Client;
use shared::codec::valid_player_name;

/// Bridges the UDP game server to a TCP GUI interface.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Host name or address of the game server.
    game_server: String,

    /// Player name; leave empty to join as an observer.
    #[arg(short = 'n', long, default_value = "")]
    player_name: String,

    /// UDP port of the game server.
    #[arg(short = 'p', long, default_value_t = 2021)]
    server_port: u16,

    /// Host name or address of the GUI interface.
    #[arg(short = 'i', long, default_value = "localhost")]
    gui_host: String,

    /// TCP port of the GUI interface.
    #[arg(short = 'r', long, default_value_t = 20210)]
    gui_port: u16,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(1);
    });
    if !valid_player_name(&args.player_name) {
        eprintln!("player name must be at most 20 printable ASCII characters (no spaces)");
        std::process::exit(1);
    }

    if args.player_name.is_empty() {
        info!("joining as an observer");
    } else {
        info!("joining as {:?}", args.player_name);
    }

    let mut client = Client::connect(
        &args.game_server,
        args.server_port,
        &args.gui_host,
        args.gui_port,
        args.player_name,
    )
    .await?;
    client.run().await?;
    Ok(())
}
