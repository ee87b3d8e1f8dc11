use anyhow::Result;
use std::sync::Arc;

use botshell::app::{Application, BootOutcome, Services};
use botshell::bus::Event;
use botshell::engine::loader::{EngineCatalog, ManifestLoader};
use botshell::logging::{obj, v_str, Logger};
use botshell::server::HealthServer;
use botshell::services::{AuthData, JsonConfigService, LoginGate, ProfileCache, SelfProfile};
use botshell::settings::ShellSettings;
use tokio::time::{sleep, Duration};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let settings = ShellSettings::from_env();
    let log = Logger::stdout();

    let gate = Arc::new(LoginGate::new());
    let services = Services {
        config: Arc::new(JsonConfigService::new(settings.config_path.clone(), gate.clone())),
        auth: gate.clone(),
        profile: Arc::new(ProfileCache::new()),
        servers: Arc::new(HealthServer::new(&settings.http_addr, &log)),
        loader: Arc::new(ManifestLoader::new(EngineCatalog::with_builtins(), &log)),
    };
    let app = Application::new(&settings, services, &log);
    let ctx = app.context();

    gate.login(AuthData {
        uid: settings.account.clone(),
        account: settings.account.clone(),
    });
    {
        let ctx = ctx.clone();
        let account = settings.account.clone();
        tokio::spawn(async move {
            ctx.when_ready().await;
            ctx.emit(Event::Login(SelfProfile {
                uid: account.clone(),
                nick: account,
            }));
        });
    }

    match app.boot().await {
        Ok(BootOutcome::Started) => {
            tokio::signal::ctrl_c().await?;
            log.info("shutdown", obj(&[("msg", v_str("interrupted"))]));
            Ok(())
        }
        Ok(BootOutcome::Disabled) => Ok(()),
        Err(_) => {
            // Already logged; give the sink a moment before exiting.
            sleep(Duration::from_millis(settings.exit_delay_ms)).await;
            std::process::exit(1);
        }
    }
}
