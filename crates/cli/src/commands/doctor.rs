use offercraft_core::config::{AppConfig, LoadOptions};
use offercraft_core::domain::offer::OfferId;
use offercraft_core::notify::NotificationRenderer;
use offercraft_core::share::ShareLinkSigner;
use offercraft_core::tenancy::TenantId;
use offercraft_db::connect_with_config;
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Self { name, status: CheckStatus::Fail, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const DEPENDENT_CHECKS: [&str; 3] =
    ["notification_templates", "share_link_signing", "database_connectivity"];

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck::pass(
                "config_validation",
                "configuration loaded and validated",
            ));
            checks.push(check_notification_templates(&config));
            checks.push(check_share_link_signing(&config));
            checks.push(check_database_connectivity(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck::fail("config_validation", error.to_string()));
            checks.extend(DEPENDENT_CHECKS.into_iter().map(|name| DoctorCheck {
                name,
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            }));
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_notification_templates(config: &AppConfig) -> DoctorCheck {
    match NotificationRenderer::new(
        &config.notifications.subject_template,
        &config.notifications.body_template,
    ) {
        Ok(_) => DoctorCheck::pass("notification_templates", "subject and body templates compile"),
        Err(error) => DoctorCheck::fail("notification_templates", error.to_string()),
    }
}

/// Signs and verifies a throwaway token with the configured secret.
fn check_share_link_signing(config: &AppConfig) -> DoctorCheck {
    let signer =
        ShareLinkSigner::new(config.sharing.base_url.clone(), config.sharing.link_secret.clone());
    let tenant_id = TenantId("doctor".to_string());
    let offer_id = OfferId("doctor-roundtrip".to_string());

    let verified = signer
        .token(&tenant_id, &offer_id)
        .and_then(|token| signer.verify(&token))
        .map(|claims| claims.tenant_id == tenant_id && claims.offer_id == offer_id);

    match verified {
        Ok(true) => DoctorCheck::pass(
            "share_link_signing",
            format!("links are issued under `{}`", config.sharing.base_url),
        ),
        Ok(false) => DoctorCheck::fail("share_link_signing", "verified claims did not match"),
        Err(error) => DoctorCheck::fail("share_link_signing", error.to_string()),
    }
}

fn check_database_connectivity(config: &AppConfig) -> DoctorCheck {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck::fail(
                "database_connectivity",
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| format!("failed to connect to database: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => DoctorCheck::pass(
            "database_connectivity",
            format!("connected using `{}`", config.database.url),
        ),
        Err(error) => DoctorCheck::fail("database_connectivity", error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::{render_human, CheckStatus, DoctorCheck, DoctorReport};

    #[test]
    fn human_report_marks_each_check() {
        let report = DoctorReport {
            overall_status: CheckStatus::Fail,
            summary: "doctor: one or more readiness checks failed".to_string(),
            checks: vec![
                DoctorCheck::pass("config_validation", "configuration loaded and validated"),
                DoctorCheck::fail("database_connectivity", "unable to open database file"),
                DoctorCheck {
                    name: "share_link_signing",
                    status: CheckStatus::Skipped,
                    details: "skipped".to_string(),
                },
            ],
        };

        assert_eq!(
            render_human(&report),
            "doctor: one or more readiness checks failed\n\
             - [ok] config_validation: configuration loaded and validated\n\
             - [fail] database_connectivity: unable to open database file\n\
             - [skip] share_link_signing: skipped"
        );
    }
}
