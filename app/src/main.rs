//! livetalk – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet eine
//! Sprach-Session. `livetalk geraete` listet die Audio-Geraete auf.

use anyhow::Result;
use livetalk::{config::AppConfig, App};
use livetalk_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("LIVETALK_CONFIG").unwrap_or_else(|_| "livetalk.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = AppConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "livetalk wird initialisiert"
    );

    match std::env::args().nth(1).as_deref() {
        Some("geraete") => App::neu(config).geraete_auflisten(),
        Some(andere) => anyhow::bail!("Unbekanntes Kommando: {andere} (erlaubt: geraete)"),
        None => App::neu(config).starten().await,
    }
}
