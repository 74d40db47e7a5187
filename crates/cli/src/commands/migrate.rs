use crate::bootstrap::bootstrap_with_config;
use crate::commands::{load_config, runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let database_url = config.database.url.clone();
    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config).await?;
        app.db_pool.close().await;
        Ok::<(), crate::bootstrap::BootstrapError>(())
    });

    match result {
        Ok(()) => CommandResult::success(
            "migrate",
            format!("applied pending migrations to `{database_url}`"),
        ),
        Err(error) => {
            let (error_class, exit_code) = error.classify();
            CommandResult::failure("migrate", error_class, error.to_string(), exit_code)
        }
    }
}
