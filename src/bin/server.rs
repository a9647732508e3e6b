use std::process::exit;
use tracing::Level;

#[rocket::main]
async fn main() {
    #[cfg(debug_assertions)]
    let level = Some(Level::DEBUG);
    #[cfg(not(debug_assertions))]
    let level = Some(Level::INFO);

    let r = match slotmark_backend::create(level).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Error building server: {}", e);
            exit(1)
        }
    };

    if let Err(e) = r.launch().await {
        tracing::error!("Error launching server: {}", e);
    }
}
