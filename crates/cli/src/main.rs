mod session;

fn main() -> anyhow::Result<()> {
    splitter_observability::init();

    let config = splitter_infra::SplitterConfig::from_env()?;
    tracing::info!(
        value_usd_feed = %config.value_usd_feed,
        fiat_usd_feed = %config.fiat_usd_feed,
        max_price_age_secs = config.max_price_age.num_seconds(),
        removal_policy = ?config.removal_policy,
        "starting in-memory session"
    );

    let report = session::run(&config)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
