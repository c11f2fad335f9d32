use anyhow::Context;
use tracing::Level;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(debug_assertions)]
    let level = Some(Level::DEBUG);
    #[cfg(not(debug_assertions))]
    let level = Some(Level::INFO);

    let r = class_scheduling::create(level)
        .await
        .context("unable to set up server")?;

    if let Err(e) = r.launch().await {
        tracing::error!("Error launching server: {}", e);
        return Err(e).context("server stopped");
    }

    Ok(())
}
