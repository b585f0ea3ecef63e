use atlas_azm::{
    Application, DeviceConfig, Entity, GainControl, GainScale, LevelSensor, MuteControl,
    SourceSelect,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AZM_HOST").ok())
        .ok_or("usage: monitor <host> [pct]")?;
    let scale = match std::env::args().nth(2).as_deref() {
        Some("pct") => GainScale::Pct,
        _ => GainScale::Db,
    };

    let config = DeviceConfig::builder(host).gain_scale(scale).build();
    let title = Application::validate(&config).await?;
    println!("Found {} at {}", title, config.host);

    let mut app = Application::new();
    let id = app.setup(config).await?;
    let device = app.device(id).ok_or("device vanished after setup")?;
    let mut events = device.subscribe_events();
    let mut health = device.coordinator().subscribe();

    println!("Watching updates, Ctrl-C to quit");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(status) = health.recv() => {
                println!("health: {:?}", status);
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        println!("(skipped {} updates)", n);
                        continue;
                    }
                    Err(_) => break,
                };
                if let Some(zone) = device.zones().iter().find(|z| z.unique_id() == event.unique_id) {
                    println!(
                        "{:<20} gain {:>6.1} ({:>3.0}%)  muted {:<5}  source {}",
                        zone.name(),
                        zone.gain(),
                        zone.fraction() * 100.0,
                        zone.is_muted(),
                        zone.source().unwrap_or_else(|| "-".to_string()),
                    );
                } else if let Some(source) =
                    device.sources().iter().find(|s| s.unique_id() == event.unique_id)
                {
                    println!(
                        "{:<20} gain {:>6.1}  muted {:<5}  level {:>6.1} dB",
                        source.name(),
                        source.gain(),
                        source.is_muted(),
                        source.level(),
                    );
                }
            }
        }
    }

    app.shutdown().await;
    Ok(())
}
