use offercraft_core::domain::client::NewClient;
use offercraft_core::domain::offer::{ArticleDraft, NewOffer, SectionDraft};
use offercraft_core::domain::template::NewTemplate;
use offercraft_core::errors::ApplicationError;
use offercraft_core::pricing::ArticlePricing;
use offercraft_core::tenancy::{Role, TenantContext};
use offercraft_db::{OfferFilter, OfferFromTemplate, OfferService, OfferSummary, SendOffer};
use rust_decimal::Decimal;
use tracing::info;

use crate::bootstrap::bootstrap_with_config;
use crate::commands::{load_config, runtime, CommandResult};

pub const DEMO_TENANT: &str = "demo";

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("seed") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let app = bootstrap_with_config(config).await.map_err(|error| {
            let (error_class, exit_code) = error.classify();
            (error_class, error.to_string(), exit_code)
        })?;
        let seeded = load_demo_dataset(&app.offers)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 6u8));
        app.db_pool.close().await;
        seeded
    });

    match result {
        Ok(offers) => CommandResult::success("seed", describe(&offers)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

/// Seeds one client, one template and three offers in different states for
/// the demo tenant. A tenant that already has offers is left untouched.
pub async fn load_demo_dataset(
    service: &OfferService,
) -> Result<Vec<OfferSummary>, ApplicationError> {
    let ctx = TenantContext::new(DEMO_TENANT, "seed", Role::TenantAdmin);

    if service.list_offers(&ctx, &OfferFilter::default()).await?.is_empty() {
        seed_offers(service, &ctx).await?;
    } else {
        info!(
            event_name = "seed.skipped",
            tenant_id = %ctx.tenant_id,
            "demo tenant already has offers"
        );
    }

    let mut offers = service.list_offers(&ctx, &OfferFilter::default()).await?;
    offers.sort_by(|left, right| left.number.as_str().cmp(right.number.as_str()));
    Ok(offers)
}

async fn seed_offers(service: &OfferService, ctx: &TenantContext) -> Result<(), ApplicationError> {
    let client = service
        .create_client(
            ctx,
            NewClient {
                company_name: "Acme GmbH".to_string(),
                email: Some("purchasing@acme.example".to_string()),
                vat_number: Some("DE123456789".to_string()),
                ..NewClient::default()
            },
        )
        .await?;

    let draft = service
        .create_offer(
            ctx,
            NewOffer {
                client_id: client.id.clone(),
                title: "Website relaunch".to_string(),
                currency: String::new(),
                valid_until: None,
                executive_summary: Some("Redesign and relaunch of acme.example".to_string()),
                terms_and_conditions: Some("Payment within 30 days".to_string()),
                sections: vec![
                    SectionDraft::new("Design").with_article(
                        article("UX workshop", 1, 120000, 0).with_unit("day"),
                    ),
                    SectionDraft::new("Build")
                        .with_article(article("Development", 40, 9500, 10).with_unit("hour"))
                        .with_article(article("CMS licence", 1, 49999, 0)),
                ],
            },
        )
        .await?;
    service.create_snapshot(ctx, &draft.id, Some("initial draft".to_string())).await?;

    let hosting = service
        .create_offer(
            ctx,
            NewOffer {
                client_id: client.id.clone(),
                title: "Managed hosting".to_string(),
                currency: String::new(),
                valid_until: None,
                executive_summary: None,
                terms_and_conditions: None,
                sections: vec![SectionDraft::new("Hosting")
                    .with_article(article("Managed server", 12, 7900, 0).with_unit("month"))],
            },
        )
        .await?;
    service.send_offer(ctx, &hosting.id, SendOffer::default()).await?;

    let template = service
        .create_template(
            ctx,
            NewTemplate {
                name: "Consulting retainer".to_string(),
                description: Some("Monthly consulting hours".to_string()),
                category: Some("consulting".to_string()),
                sections: vec![SectionDraft::new("Retainer")
                    .with_article(article("Consulting", 10, 11000, 5).with_unit("hour"))],
                terms: Some("Billed monthly".to_string()),
                validity_days: Some(14),
            },
        )
        .await?;
    let retainer = service
        .create_offer_from_template(
            ctx,
            &template.id,
            OfferFromTemplate { client_id: client.id, title: None, currency: None },
        )
        .await?;
    service.submit_for_approval(ctx, &retainer.id).await?;

    info!(event_name = "seed.completed", tenant_id = %ctx.tenant_id, "demo dataset seeded");
    Ok(())
}

/// Demo article at 19% VAT; `unit_price_cents` is in minor units.
fn article(
    name: &str,
    quantity: i64,
    unit_price_cents: i64,
    discount_percent: i64,
) -> ArticleDraft {
    ArticleDraft::new(
        name,
        ArticlePricing::new(
            Decimal::new(quantity, 0),
            Decimal::new(unit_price_cents, 2),
            Decimal::new(19, 0),
        )
        .with_discount_percent(Decimal::new(discount_percent, 0)),
    )
}

fn describe(offers: &[OfferSummary]) -> String {
    let lines: Vec<String> = offers
        .iter()
        .map(|offer| {
            format!(
                "  - {}: {} ({}, {} {})",
                offer.status.as_str().to_ascii_lowercase(),
                offer.number,
                offer.title,
                offer.total,
                offer.currency
            )
        })
        .collect();
    format!("demo dataset ready for tenant `{DEMO_TENANT}`:\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use offercraft_core::domain::offer::OfferStatus;
    use offercraft_core::notify::InMemoryNotifier;
    use offercraft_core::share::ShareLinkSigner;
    use offercraft_db::{connect_with_settings, migrations, OfferService, OfferSettings};
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::load_demo_dataset;

    async fn service(notifier: &InMemoryNotifier) -> OfferService {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        OfferService::new(
            pool,
            OfferSettings::default(),
            ShareLinkSigner::new(
                "https://offers.example.test",
                SecretString::from("seed-test-secret-00001".to_string()),
            ),
            Arc::new(notifier.clone()),
        )
    }

    #[tokio::test]
    async fn demo_dataset_covers_three_states_and_is_not_duplicated() {
        let notifier = InMemoryNotifier::default();
        let service = service(&notifier).await;

        let first = load_demo_dataset(&service).await.expect("first seed");
        let statuses: Vec<OfferStatus> = first.iter().map(|offer| offer.status).collect();
        assert_eq!(
            statuses,
            vec![OfferStatus::Draft, OfferStatus::Sent, OfferStatus::PendingApproval]
        );
        assert_eq!(first[1].total, Decimal::new(112812, 2));
        assert_eq!(notifier.delivered().len(), 1);

        let second = load_demo_dataset(&service).await.expect("second seed");
        assert_eq!(second, first);
        assert_eq!(notifier.delivered().len(), 1);
    }
}
