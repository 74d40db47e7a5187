use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;

use offercraft_core::activity::{ActivityKind, PUBLIC_LINK_ACTOR, SYSTEM_ACTOR};
use offercraft_core::domain::article_template::{ArticleTemplateFilter, NewArticleTemplate};
use offercraft_core::domain::client::{Client, NewClient};
use offercraft_core::domain::offer::{ArticleDraft, NewOffer, OfferStatus, SectionDraft};
use offercraft_core::domain::signature::{RequestProvenance, SignatureInput};
use offercraft_core::domain::template::NewTemplate;
use offercraft_core::domain::version::backup_note;
use offercraft_core::errors::{ApplicationError, DomainError, ErrorKind};
use offercraft_core::notify::InMemoryNotifier;
use offercraft_core::pricing::ArticlePricing;
use offercraft_core::share::ShareLinkSigner;
use offercraft_core::tenancy::{Role, TenantContext};
use offercraft_db::{
    connect_with_settings, migrations, DbPool, DuplicateOffer, FixedClock, OfferFilter,
    OfferFromTemplate, OfferService, OfferSettings, SendOffer,
};

const LINK_SECRET: &str = "test-link-secret-0123456789";

fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).single().expect("valid timestamp")
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

fn ctx() -> TenantContext {
    TenantContext::new("tenant-a", "user-1", Role::Manager)
}

async fn memory_pool() -> DbPool {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");
    pool
}

fn service_at(pool: DbPool, notifier: &InMemoryNotifier, now: DateTime<Utc>) -> OfferService {
    OfferService::new(
        pool,
        OfferSettings::default(),
        ShareLinkSigner::new(
            "https://offers.example.test",
            SecretString::from(LINK_SECRET.to_string()),
        ),
        Arc::new(notifier.clone()),
    )
    .with_clock(Arc::new(FixedClock(now)))
}

async fn setup() -> (OfferService, InMemoryNotifier) {
    let notifier = InMemoryNotifier::default();
    (service_at(memory_pool().await, &notifier, at(2026, 3, 16)), notifier)
}

async fn client(service: &OfferService, ctx: &TenantContext, email: Option<&str>) -> Client {
    service
        .create_client(
            ctx,
            NewClient {
                company_name: "Acme GmbH".to_string(),
                email: email.map(str::to_string),
                ..NewClient::default()
            },
        )
        .await
        .expect("client")
}

fn consulting() -> ArticleDraft {
    ArticleDraft::new(
        "Consulting",
        ArticlePricing::new(Decimal::new(3, 0), Decimal::new(2000, 2), Decimal::new(21, 0))
            .with_discount_percent(Decimal::new(10, 0)),
    )
    .with_unit("hours")
}

fn website_offer(client: &Client) -> NewOffer {
    NewOffer {
        client_id: client.id.clone(),
        title: "Website relaunch".to_string(),
        currency: "EUR".to_string(),
        valid_until: Some(date(2026, 4, 30)),
        executive_summary: Some("Relaunch of the corporate website".to_string()),
        terms_and_conditions: Some("Net 30".to_string()),
        sections: vec![SectionDraft::new("Services").with_article(consulting())],
    }
}

fn token_of(link: &str) -> &str {
    link.rsplit('/').next().expect("token segment")
}

fn signature_input() -> SignatureInput {
    SignatureInput {
        signer_name: "Dana Buyer".to_string(),
        signer_email: "dana@acme.test".to_string(),
        payload: "data:image/png;base64,iVBORw0KGgo=".to_string(),
    }
}

fn provenance() -> RequestProvenance {
    RequestProvenance::from_headers(
        Some("203.0.113.7, 10.0.0.1"),
        None,
        Some("Mozilla/5.0 (X11; Linux x86_64)"),
    )
}

#[tokio::test]
async fn offers_are_numbered_per_month_and_start_as_drafts() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;

    let mut numbers = Vec::new();
    for _ in 0..3 {
        let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
        assert_eq!(offer.status(), OfferStatus::Draft);
        assert_eq!(offer.totals().total, Decimal::new(6534, 2));
        numbers.push(offer.number.to_string());
    }
    assert_eq!(numbers, vec!["OFR-202603-0001", "OFR-202603-0002", "OFR-202603-0003"]);

    let listed = service.list_offers(&ctx, &OfferFilter::default()).await.expect("list");
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0].number.as_str(), "OFR-202603-0003");
}

#[tokio::test]
async fn missing_currency_and_validity_use_configured_defaults() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let mut draft = website_offer(&client);
    draft.currency = String::new();
    draft.valid_until = None;

    let offer = service.create_offer(&ctx, draft).await.expect("create");
    assert_eq!(offer.currency, "EUR");
    assert_eq!(offer.valid_until, Some(date(2026, 4, 15)));
}

#[tokio::test]
async fn creation_is_recorded_and_reloads_identically() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let loaded = service.get_offer(&ctx, &offer.id).await.expect("load");
    assert_eq!(loaded, offer);

    let activity = service.list_activity(&ctx, &offer.id).await.expect("activity");
    assert_eq!(activity.len(), 1);
    assert_eq!(activity[0].kind, ActivityKind::Created);
    assert_eq!(activity[0].actor, "user:user-1");
    assert_eq!(activity[0].metadata.get("number").map(String::as_str), Some("OFR-202603-0001"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creations_never_share_a_number() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("offers.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let notifier = InMemoryNotifier::default();
    let service = Arc::new(service_at(pool, &notifier, at(2026, 3, 16)));
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;

    for _ in 0..2 {
        service.create_offer(&ctx, website_offer(&client)).await.expect("sequential create");
    }

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = Arc::clone(&service);
        let ctx = ctx.clone();
        let draft = website_offer(&client);
        handles.push(tokio::spawn(async move { service.create_offer(&ctx, draft).await }));
    }

    let mut numbers = HashSet::new();
    for handle in handles {
        let offer = handle.await.expect("task").expect("concurrent create");
        numbers.insert(offer.number.to_string());
    }
    assert_eq!(
        numbers,
        HashSet::from(["OFR-202603-0003".to_string(), "OFR-202603-0004".to_string()])
    );
}

#[tokio::test]
async fn tenants_cannot_reach_each_others_offers_or_clients() {
    let (service, _) = setup().await;
    let owner = ctx();
    let stranger = TenantContext::new("tenant-b", "user-9", Role::TenantAdmin);
    let client = client(&service, &owner, None).await;
    let offer = service.create_offer(&owner, website_offer(&client)).await.expect("create");

    let error = service.get_offer(&stranger, &offer.id).await.expect_err("foreign offer");
    assert_eq!(error.kind(), ErrorKind::NotFound);

    let error = service
        .create_offer(&stranger, website_offer(&client))
        .await
        .expect_err("foreign client");
    assert!(matches!(error, ApplicationError::NotFound { entity: "client", .. }));

    assert!(service
        .list_offers(&stranger, &OfferFilter::default())
        .await
        .expect("list")
        .is_empty());
    assert_eq!(
        service.list_snapshots(&stranger, &offer.id).await.expect_err("snapshots").kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn stale_update_is_rejected_and_first_write_survives() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let created = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let mut first = service.get_offer(&ctx, &created.id).await.expect("first copy");
    let mut second = service.get_offer(&ctx, &created.id).await.expect("second copy");

    first.rename("Website relaunch, phase 1").expect("rename");
    let saved = service.update_offer(&ctx, first).await.expect("first save");
    assert_eq!(saved.revision(), created.revision() + 1);

    second.rename("Something else").expect("rename");
    let error = service.update_offer(&ctx, second).await.expect_err("stale save");
    assert_eq!(error.kind(), ErrorKind::Conflict);

    let current = service.get_offer(&ctx, &created.id).await.expect("reload");
    assert_eq!(current.title, "Website relaunch, phase 1");
}

#[tokio::test]
async fn line_item_edits_are_persisted_with_recomputed_totals() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let created = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let mut offer = service.get_offer(&ctx, &created.id).await.expect("load");
    let licences = offer.add_section(SectionDraft::new("Licences")).expect("section");
    offer
        .add_article(
            &licences,
            ArticleDraft::new(
                "CMS licence",
                ArticlePricing::new(Decimal::ONE, Decimal::new(49999, 2), Decimal::new(21, 0))
                    .with_discount_fixed(Decimal::new(1000, 2)),
            ),
        )
        .expect("article");
    service.update_offer(&ctx, offer).await.expect("save");

    let reloaded = service.get_offer(&ctx, &created.id).await.expect("reload");
    assert_eq!(reloaded.sections().len(), 2);
    assert_eq!(reloaded.totals().total, Decimal::new(65823, 2));
    let article_sum: Decimal = reloaded.articles().map(|article| article.total()).sum();
    assert_eq!(article_sum, reloaded.totals().total);
}

#[tokio::test]
async fn restoring_a_version_reproduces_its_content() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let created = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let v1 = service
        .create_snapshot(&ctx, &created.id, Some("  first draft  ".to_string()))
        .await
        .expect("v1");
    assert_eq!(v1.version, 1);
    assert_eq!(v1.note.as_deref(), Some("first draft"));

    let mut edited = service.get_offer(&ctx, &created.id).await.expect("load");
    edited.rename("Website relaunch XL").expect("rename");
    let services = edited.sections()[0].id.clone();
    edited.add_article(&services, consulting()).expect("article");
    let edited = service.update_offer(&ctx, edited).await.expect("save");
    let v2 = service.create_snapshot(&ctx, &created.id, None).await.expect("v2");
    assert_ne!(v2.content_hash, v1.content_hash);

    let restored = service.restore_snapshot(&ctx, &created.id, &v1.id).await.expect("restore");
    assert_eq!(restored.restored_version, 1);
    assert_eq!(restored.backup.version, 3);
    assert_eq!(restored.backup.note, Some(backup_note(1)));
    assert_eq!(restored.backup.content_hash, v2.content_hash);
    assert_eq!(restored.offer.title, "Website relaunch");
    assert_eq!(restored.offer.totals(), created.totals());
    assert_eq!(restored.offer.revision(), edited.revision() + 1);

    let v4 = service.create_snapshot(&ctx, &created.id, None).await.expect("v4");
    assert_eq!(v4.content_hash, v1.content_hash);
    assert_eq!(v4.content, v1.content);

    let versions: Vec<u32> = service
        .list_snapshots(&ctx, &created.id)
        .await
        .expect("list")
        .iter()
        .map(|version| version.version)
        .collect();
    assert_eq!(versions, vec![4, 3, 2, 1]);

    let kinds: Vec<ActivityKind> = service
        .list_activity(&ctx, &created.id)
        .await
        .expect("activity")
        .iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(kinds.iter().filter(|kind| **kind == ActivityKind::Restored).count(), 1);
    assert_eq!(kinds.iter().filter(|kind| **kind == ActivityKind::VersionCreated).count(), 3);
}

#[tokio::test]
async fn restoring_an_unknown_version_changes_nothing() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let error = service
        .restore_snapshot(
            &ctx,
            &offer.id,
            &offercraft_core::domain::version::VersionId("missing".to_string()),
        )
        .await
        .expect_err("unknown version");
    assert!(matches!(error, ApplicationError::NotFound { entity: "version", .. }));
    assert!(service.list_snapshots(&ctx, &offer.id).await.expect("list").is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_snapshots_get_contiguous_versions() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("versions.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let notifier = InMemoryNotifier::default();
    let service = Arc::new(service_at(pool, &notifier, at(2026, 3, 16)));
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let mut handles = Vec::new();
    for index in 0..8 {
        let service = Arc::clone(&service);
        let ctx = ctx.clone();
        let id = offer.id.clone();
        handles.push(tokio::spawn(async move {
            service.create_snapshot(&ctx, &id, Some(format!("writer {index}"))).await
        }));
    }

    let mut assigned = Vec::new();
    for handle in handles {
        assigned.push(handle.await.expect("task").expect("concurrent snapshot").version);
    }
    assigned.sort_unstable();
    assert_eq!(assigned, (1..=8).collect::<Vec<u32>>());

    let listed: Vec<u32> = service
        .list_snapshots(&ctx, &offer.id)
        .await
        .expect("list")
        .iter()
        .map(|version| version.version)
        .collect();
    assert_eq!(listed, (1..=8).rev().collect::<Vec<u32>>());
}

#[tokio::test]
async fn failed_restore_rolls_back_the_backup_version() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let v1 = service.create_snapshot(&ctx, &offer.id, None).await.expect("v1");

    // Still decodes, but an empty title cannot be applied to the offer.
    sqlx::query(
        "UPDATE offer_version SET content_json = json_set(content_json, '$.offer.title', '')
         WHERE id = ?",
    )
    .bind(&v1.id.0)
    .execute(service.pool())
    .await
    .expect("edit stored snapshot");

    let error =
        service.restore_snapshot(&ctx, &offer.id, &v1.id).await.expect_err("unusable snapshot");
    assert_eq!(error.kind(), ErrorKind::Validation);

    let versions: Vec<u32> = service
        .list_snapshots(&ctx, &offer.id)
        .await
        .expect("list")
        .iter()
        .map(|version| version.version)
        .collect();
    assert_eq!(versions, vec![1]);

    let current = service.get_offer(&ctx, &offer.id).await.expect("reload");
    assert_eq!(current, offer);
    let kinds: Vec<ActivityKind> = service
        .list_activity(&ctx, &offer.id)
        .await
        .expect("activity")
        .iter()
        .map(|event| event.kind)
        .collect();
    assert!(!kinds.contains(&ActivityKind::Restored));

    let next = service.create_snapshot(&ctx, &offer.id, None).await.expect("v2");
    assert_eq!(next.version, 2);
}

#[tokio::test]
async fn out_of_range_prices_are_rejected_without_using_a_number() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;

    let mut draft = website_offer(&client);
    draft.sections = vec![SectionDraft::new("Services").with_article(ArticleDraft::new(
        "Everything",
        ArticlePricing::new(Decimal::ONE, Decimal::MAX, Decimal::ONE),
    ))];
    let error = service.create_offer(&ctx, draft).await.expect_err("price out of range");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::Validation { ref field, .. }) if field == "unit_price"
    ));

    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    assert_eq!(offer.number.as_str(), "OFR-202603-0001");
}

#[tokio::test]
async fn article_catalogue_is_searchable_and_feeds_offer_lines() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let other = TenantContext::new("tenant-b", "user-9", Role::Manager);

    let hosting = service
        .create_article_template(
            &ctx,
            NewArticleTemplate::new("Managed server", Decimal::new(7_900, 2), Decimal::from(19))
                .with_category("hosting")
                .with_unit("month")
                .with_description("Patched and monitored"),
        )
        .await
        .expect("hosting");
    let backup = service
        .create_article_template(
            &ctx,
            NewArticleTemplate::new("Offsite backup", Decimal::new(1_500, 2), Decimal::from(19))
                .with_category("hosting"),
        )
        .await
        .expect("backup");
    service
        .create_article_template(
            &ctx,
            NewArticleTemplate::new("Server audit", Decimal::new(95_000, 2), Decimal::from(19))
                .with_category("consulting"),
        )
        .await
        .expect("audit");
    service
        .create_article_template(
            &other,
            NewArticleTemplate::new("Managed server", Decimal::new(5_000, 2), Decimal::from(19)),
        )
        .await
        .expect("foreign");

    let servers = service
        .list_article_templates(
            &ctx,
            &ArticleTemplateFilter { search: Some("server".to_string()), ..Default::default() },
        )
        .await
        .expect("search");
    let names: Vec<_> = servers.iter().map(|template| template.name.as_str()).collect();
    assert_eq!(names, ["Managed server", "Server audit"]);

    let hosting_only = ArticleTemplateFilter {
        category: Some("hosting".to_string()),
        ..Default::default()
    };
    assert_eq!(service.list_article_templates(&ctx, &hosting_only).await.expect("list").len(), 2);
    assert_eq!(
        service.article_template_categories(&ctx).await.expect("categories"),
        ["consulting".to_string(), "hosting".to_string()]
    );
    let foreign = service.get_article_template(&other, &hosting.id).await.expect_err("isolated");
    assert_eq!(foreign.kind(), ErrorKind::NotFound);

    let article = service
        .article_from_template(&ctx, &hosting.id, Decimal::from(12))
        .await
        .expect("article");
    assert_eq!(article.unit, "month");
    let client = client(&service, &ctx, None).await;
    let offer = service
        .create_offer(
            &ctx,
            NewOffer {
                sections: vec![SectionDraft::new("Hosting").with_article(article)],
                ..website_offer(&client)
            },
        )
        .await
        .expect("offer");
    assert_eq!(offer.totals().total, Decimal::new(112_812, 2));

    service.deactivate_article_template(&ctx, &backup.id).await.expect("deactivate");
    assert_eq!(service.list_article_templates(&ctx, &hosting_only).await.expect("list").len(), 1);
    let retired = service
        .article_from_template(&ctx, &backup.id, Decimal::ONE)
        .await
        .expect_err("retired");
    assert_eq!(retired.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn send_renders_and_delivers_the_notification() {
    let (service, notifier) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let receipt =
        service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send");
    assert!(receipt.delivered);
    assert_eq!(receipt.recipient, "buyer@acme.test");
    assert_eq!(receipt.offer.status(), OfferStatus::Sent);
    assert_eq!(receipt.offer.sent_at(), Some(at(2026, 3, 16)));
    assert!(receipt.share_link.starts_with("https://offers.example.test/shared/offers/"));

    let delivered = notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].subject, "Offer OFR-202603-0001 from OfferCraft");
    assert!(delivered[0].body.starts_with("Dear Acme GmbH,"));
    assert!(delivered[0].body.contains("Website relaunch (65.34 EUR)"));
    assert!(delivered[0].body.contains(&receipt.share_link));

    let sent = service.list_activity(&ctx, &offer.id).await.expect("activity");
    assert_eq!(sent[0].kind, ActivityKind::Sent);
    assert_eq!(sent[0].metadata.get("recipient").map(String::as_str), Some("buyer@acme.test"));
}

#[tokio::test]
async fn custom_subject_and_message_are_rendered_with_offer_variables() {
    let (service, notifier) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    service
        .send_offer(
            &ctx,
            &offer.id,
            SendOffer {
                recipient: Some("cfo@acme.test".to_string()),
                subject: Some("Proposal {{ offerNumber }}".to_string()),
                message: Some("Total: {{ total }}".to_string()),
            },
        )
        .await
        .expect("send");

    let delivered = notifier.delivered();
    assert_eq!(delivered[0].recipient, "cfo@acme.test");
    assert_eq!(delivered[0].subject, "Proposal OFR-202603-0001");
    assert_eq!(delivered[0].body, "Total: 65.34 EUR");
}

#[tokio::test]
async fn send_without_any_recipient_is_a_validation_error() {
    let (service, notifier) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let error = service
        .send_offer(&ctx, &offer.id, SendOffer::default())
        .await
        .expect_err("no recipient");
    assert!(matches!(
        error,
        ApplicationError::Domain(DomainError::Validation { ref field, .. }) if field == "recipient"
    ));
    let reloaded = service.get_offer(&ctx, &offer.id).await.expect("load");
    assert_eq!(reloaded.status(), OfferStatus::Draft);
    assert!(notifier.delivered().is_empty());
}

#[tokio::test]
async fn failed_notification_does_not_roll_back_the_send() {
    let notifier = InMemoryNotifier::failing();
    let service = service_at(memory_pool().await, &notifier, at(2026, 3, 16));
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let receipt =
        service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send commits");
    assert!(!receipt.delivered);
    assert_eq!(service.get_offer(&ctx, &offer.id).await.expect("load").status(), OfferStatus::Sent);
}

#[tokio::test]
async fn approval_step_precedes_sending() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");

    let pending = service.submit_for_approval(&ctx, &offer.id).await.expect("submit");
    assert_eq!(pending.status(), OfferStatus::PendingApproval);
    let draft = service.return_to_draft(&ctx, &offer.id).await.expect("back to draft");
    assert_eq!(draft.status(), OfferStatus::Draft);
    service.submit_for_approval(&ctx, &offer.id).await.expect("submit again");

    let receipt =
        service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("approved send");
    assert_eq!(receipt.offer.status(), OfferStatus::Sent);

    let error = service
        .send_offer(&ctx, &offer.id, SendOffer::default())
        .await
        .expect_err("re-send");
    assert_eq!(error.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn public_link_view_is_recorded_once() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let receipt = service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send");
    let token = token_of(&receipt.share_link);

    let first = service.view_offer(token).await.expect("first view");
    let second = service.view_offer(token).await.expect("second view");
    assert_eq!(first.status(), OfferStatus::Viewed);
    assert_eq!(second.viewed_at(), first.viewed_at());
    assert_eq!(second.revision(), first.revision());

    let views: Vec<_> = service
        .list_activity(&ctx, &offer.id)
        .await
        .expect("activity")
        .into_iter()
        .filter(|event| event.kind == ActivityKind::Viewed)
        .collect();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].actor, PUBLIC_LINK_ACTOR);
}

#[tokio::test]
async fn draft_offers_cannot_be_viewed_or_signed_through_a_link() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let link = service.share_link(&ctx, &offer.id).await.expect("link");
    let token = token_of(&link);

    assert_eq!(
        service.view_offer(token).await.expect_err("draft view").kind(),
        ErrorKind::InvalidTransition
    );
    assert_eq!(
        service
            .sign_offer(token, signature_input(), provenance())
            .await
            .expect_err("draft signature")
            .kind(),
        ErrorKind::InvalidTransition
    );
    assert_eq!(
        service.signature_status(token).await.expect_err("draft status").kind(),
        ErrorKind::InvalidTransition
    );
}

#[tokio::test]
async fn second_signature_conflicts_and_first_is_kept() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let receipt = service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send");
    let token = token_of(&receipt.share_link);

    let status = service.signature_status(token).await.expect("status before signing");
    assert!(!status.has_signed);

    let signed = service.sign_offer(token, signature_input(), provenance()).await.expect("sign");
    assert_eq!(signed.offer.status(), OfferStatus::Accepted);
    assert_eq!(signed.offer.accepted_at(), Some(at(2026, 3, 16)));
    assert_eq!(signed.signature.ip_address, "203.0.113.7");

    let error = service
        .sign_offer(
            token,
            SignatureInput {
                signer_name: "Mallory".to_string(),
                signer_email: "mallory@evil.test".to_string(),
                payload: "other".to_string(),
            },
            provenance(),
        )
        .await
        .expect_err("second signature");
    assert_eq!(error.kind(), ErrorKind::Conflict);

    let status = service.signature_status(token).await.expect("status after signing");
    assert!(status.has_signed);
    assert_eq!(status.signer_name.as_deref(), Some("Dana Buyer"));
    assert_eq!(status.signed_at, Some(signed.signature.signed_at));

    let document = service.export_offer(&ctx, &offer.id).await.expect("export");
    assert_eq!(document.signature, Some(signed.signature));
    assert_eq!(document.client.id, client.id);
}

#[tokio::test]
async fn accepted_offer_cannot_be_sent_again() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let receipt = service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send");
    service
        .sign_offer(token_of(&receipt.share_link), signature_input(), provenance())
        .await
        .expect("sign");

    let error = service
        .send_offer(&ctx, &offer.id, SendOffer::default())
        .await
        .expect_err("terminal");
    assert_eq!(error.to_string(), "invalid offer transition from ACCEPTED to SENT");
    assert_eq!(
        service.get_offer(&ctx, &offer.id).await.expect("load").status(),
        OfferStatus::Accepted
    );
}

#[tokio::test]
async fn client_can_reject_through_the_link() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let offer = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let receipt = service.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send");

    let rejected = service
        .reject_offer(token_of(&receipt.share_link), Some("Budget cut".to_string()))
        .await
        .expect("reject");
    assert_eq!(rejected.status(), OfferStatus::Rejected);

    let activity = service.list_activity(&ctx, &offer.id).await.expect("activity");
    assert_eq!(activity[0].kind, ActivityKind::Rejected);
    assert_eq!(activity[0].metadata.get("reason").map(String::as_str), Some("Budget cut"));
}

#[tokio::test]
async fn forged_tokens_are_refused() {
    let (service, _) = setup().await;
    let error = service
        .view_offer("tenant-a.some-offer.00ff00ff")
        .await
        .expect_err("forged token");
    assert_eq!(error.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn overdue_offers_expire_when_next_read() {
    let notifier = InMemoryNotifier::default();
    let pool = memory_pool().await;
    let march = service_at(pool.clone(), &notifier, at(2026, 3, 16));
    let ctx = ctx();
    let client = client(&march, &ctx, Some("buyer@acme.test")).await;
    let mut draft = website_offer(&client);
    draft.valid_until = Some(date(2026, 3, 20));
    let offer = march.create_offer(&ctx, draft).await.expect("create");
    march.send_offer(&ctx, &offer.id, SendOffer::default()).await.expect("send");

    let later = service_at(pool, &notifier, at(2026, 3, 25));
    let listed = later
        .list_offers(
            &ctx,
            &OfferFilter { status: Some(OfferStatus::Expired), ..OfferFilter::default() },
        )
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, offer.id);

    let expired = later.get_offer(&ctx, &offer.id).await.expect("load");
    assert_eq!(expired.status(), OfferStatus::Expired);

    let activity = later.list_activity(&ctx, &offer.id).await.expect("activity");
    assert_eq!(activity[0].kind, ActivityKind::Expired);
    assert_eq!(activity[0].actor, SYSTEM_ACTOR);
    assert_eq!(activity.iter().filter(|event| event.kind == ActivityKind::Expired).count(), 1);
}

#[tokio::test]
async fn listing_filters_by_status_and_search_term() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let website = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    let mut hosting = website_offer(&client);
    hosting.title = "Managed hosting".to_string();
    let hosting = service.create_offer(&ctx, hosting).await.expect("create");
    service.send_offer(&ctx, &hosting.id, SendOffer::default()).await.expect("send");

    let sent = service
        .list_offers(
            &ctx,
            &OfferFilter { status: Some(OfferStatus::Sent), ..OfferFilter::default() },
        )
        .await
        .expect("list");
    assert_eq!(sent.iter().map(|offer| &offer.id).collect::<Vec<_>>(), vec![&hosting.id]);

    let searched = service
        .list_offers(
            &ctx,
            &OfferFilter { search: Some("website".to_string()), ..OfferFilter::default() },
        )
        .await
        .expect("search");
    assert_eq!(searched.len(), 1);
    assert_eq!(searched[0].id, website.id);

    let by_number = service
        .list_offers(
            &ctx,
            &OfferFilter { search: Some("202603-0002".to_string()), ..OfferFilter::default() },
        )
        .await
        .expect("search by number");
    assert_eq!(by_number[0].id, hosting.id);
}

#[tokio::test]
async fn duplicate_copies_the_tree_under_a_new_number() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, Some("buyer@acme.test")).await;
    let source = service.create_offer(&ctx, website_offer(&client)).await.expect("create");
    service.send_offer(&ctx, &source.id, SendOffer::default()).await.expect("send");

    let copy = service
        .duplicate_offer(&ctx, &source.id, DuplicateOffer::default())
        .await
        .expect("duplicate");
    assert_eq!(copy.number.as_str(), "OFR-202603-0002");
    assert_eq!(copy.title, "Website relaunch (Copy)");
    assert_eq!(copy.status(), OfferStatus::Draft);
    assert_eq!(copy.totals(), source.totals());
    assert_eq!(copy.valid_until, None);
    assert_ne!(copy.sections()[0].id, source.sections()[0].id);

    let source_activity = service.list_activity(&ctx, &source.id).await.expect("activity");
    assert_eq!(source_activity[0].kind, ActivityKind::Duplicated);
    assert_eq!(
        source_activity[0].metadata.get("duplicate_id").map(String::as_str),
        Some(copy.id.0.as_str())
    );
    let copy_activity = service.list_activity(&ctx, &copy.id).await.expect("activity");
    assert_eq!(copy_activity.len(), 1);
    assert_eq!(copy_activity[0].kind, ActivityKind::Created);
}

#[tokio::test]
async fn templates_seed_new_offers() {
    let (service, _) = setup().await;
    let ctx = ctx();
    let client = client(&service, &ctx, None).await;
    let template = service
        .create_template(
            &ctx,
            NewTemplate {
                name: "Consulting retainer".to_string(),
                description: Some("Monthly consulting".to_string()),
                sections: vec![SectionDraft::new("Retainer").with_article(consulting())],
                terms: Some("Net 14".to_string()),
                validity_days: Some(14),
                ..NewTemplate::default()
            },
        )
        .await
        .expect("template");

    let offer = service
        .create_offer_from_template(
            &ctx,
            &template.id,
            OfferFromTemplate { client_id: client.id.clone(), title: None, currency: None },
        )
        .await
        .expect("from template");
    assert_eq!(offer.title, "Consulting retainer");
    assert_eq!(offer.currency, "EUR");
    assert_eq!(offer.valid_until, Some(date(2026, 3, 30)));
    assert_eq!(offer.terms_and_conditions.as_deref(), Some("Net 14"));
    assert_eq!(offer.totals().total, Decimal::new(6534, 2));

    let from_offer = service
        .create_template_from_offer(&ctx, &offer.id, "Retainer copy")
        .await
        .expect("template from offer");
    assert_eq!(from_offer.sections.len(), 1);
    assert_eq!(service.list_templates(&ctx).await.expect("list").len(), 2);
}
