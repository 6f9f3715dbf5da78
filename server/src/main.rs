use clap::Parser;
use log::info;
use server::network::Server;
use shared::GameConfig;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Simulation ticks per second
    #[arg(short, long, default_value = "60")]
    tick_rate: u32,

    /// Maximum number of connected clients
    #[arg(short, long, default_value = "16")]
    max_clients: usize,

    /// Health removed by one confirmed hit
    #[arg(long)]
    attack_damage: Option<f32>,

    /// Stamina spent to start an attack
    #[arg(long)]
    attack_stamina_cost: Option<f32>,
}

impl Args {
    fn game_config(&self) -> GameConfig {
        let mut config = GameConfig::default();
        if let Some(damage) = self.attack_damage {
            config.combat.damage_amount = damage;
        }
        if let Some(cost) = self.attack_stamina_cost {
            config.combat.attack_stamina_cost = cost;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = args.game_config();
    let address = format!("{}:{}", args.host, args.port);
    let tick_duration = Duration::from_secs_f64(1.0 / args.tick_rate.max(1) as f64);

    info!("Starting server on {} at {}Hz", address, args.tick_rate);
    info!(
        "Attack: {:.1} stamina, {:.1} damage, {:.2}s lockout",
        config.combat.attack_stamina_cost,
        config.combat.damage_amount,
        config.combat.attack_lockout_secs
    );

    let mut server = Server::new(&address, tick_duration, args.max_clients, config).await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
    }

    Ok(())
}
