mod app;
mod error;
mod mailer;
mod registry;
mod state;
mod types;

#[tokio::main]
async fn main() {
    app::run().await;
}
