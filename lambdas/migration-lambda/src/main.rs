use hierarchy_block::MigrationUtility;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use shigodeki_shared::logging::init_tracing;
use shigodeki_shared::{AppConfig, AppState};
use std::sync::Arc;

mod migration_handler;
use migration_handler::{function_handler, MigrationRequest};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = AppConfig::from_env();
    init_tracing(config.log_format);

    let state = Arc::new(AppState::from_config(config).await);
    // One utility per container so a warm instance refuses concurrent runs
    // for the same family.
    let utility = Arc::new(MigrationUtility::new(Arc::clone(&state.store)));

    run(service_fn(move |event: LambdaEvent<MigrationRequest>| {
        let state = Arc::clone(&state);
        let utility = Arc::clone(&utility);
        async move { function_handler(&state, &utility, event).await }
    }))
    .await
}
