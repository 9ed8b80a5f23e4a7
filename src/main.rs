#[tokio::main]
async fn main() {
    if let Err(e) = fundflow::run().await {
        eprintln!("fundflow: {e}");
        std::process::exit(1);
    }
}
