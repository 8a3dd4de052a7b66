#[tokio::main]
async fn main() {
    referral_server::start_server().await;
}
