use qrforge::{
    configuration::get_configuration,
    startup,
    telemetry::{get_subscriber, init_subscriber},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_configuration()?;
    let subscriber = get_subscriber("qrforge".into(), &settings.telemetry, std::io::stdout)?;
    init_subscriber(subscriber)?;

    let result = startup::run(settings).await;
    opentelemetry::global::shutdown_tracer_provider();
    result
}
