#[tokio::main]
async fn main() {
    if let Err(err) = lens_api::run().await {
        eprintln!("lens-api failed to start: {err}");
        std::process::exit(1);
    }
}
