use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = comment_insights::config::Settings::from_env()?;
    comment_insights::logging::init(&settings.log_level);

    comment_insights::app::run(settings).await
}
