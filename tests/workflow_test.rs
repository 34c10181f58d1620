/// Item workflow against a scripted browser: every outcome yields exactly one
/// record and always closes what it opened.
mod support;

use contact_scout::features::humanize::{InstantPacer, Pacer};
use contact_scout::tools::ItemWorkflow;
use contact_scout::{ContactStatus, FieldExtractor, FieldKind, Provenance};
use std::time::Duration;
use support::{
    fast_config, init_logger, CallLog, FakeBrowser, Script, SteadyTypist, SAMPLE_CARD,
};

const LONG_ADDRESS: &str = "maria.jose.garcia-lopez.fernandez@madrid.example.org";

async fn run_one(browser: &FakeBrowser, identifier: &str) -> contact_scout::ContactRecord {
    run_paced(browser, &InstantPacer, identifier).await
}

async fn run_paced(
    browser: &FakeBrowser,
    pacer: &dyn Pacer,
    identifier: &str,
) -> contact_scout::ContactRecord {
    let config = fast_config();
    let extractor = FieldExtractor::new(&config.extraction).unwrap();
    ItemWorkflow::new(browser, pacer, &extractor, &config.wait_times)
        .run(identifier)
        .await
}

#[tokio::test]
async fn test_card_fields_are_extracted() {
    init_logger();
    let browser = FakeBrowser::new([("john.doe@example.org", Script::card(SAMPLE_CARD))]);

    let record = run_one(&browser, "john.doe@example.org").await;

    assert_eq!(record.status, ContactStatus::Success);
    assert_eq!(record.identifier(), "john.doe@example.org");
    assert_eq!(record.field(FieldKind::FullName), Some("DOE, JOHN"));
    assert_eq!(record.field(FieldKind::PersonalEmail), Some("john.doe@example.org"));
    assert_eq!(record.field(FieldKind::SipAddress), Some("sip:john.doe@example.org"));
    assert_eq!(record.field(FieldKind::WorkPhone), Some("916704092"));
    assert_eq!(
        record.field(FieldKind::PostalAddress),
        Some("C/ MAYOR, 1 28001 MADRID")
    );
    assert_eq!(
        record.fields.provenance_of(FieldKind::WorkPhone),
        Provenance::Pattern
    );
    assert!(record.error_detail.is_none());

    assert_eq!(CallLog::count(&browser.calls.compose_opened), 1);
    assert_eq!(CallLog::count(&browser.calls.cards_closed), 1);
    assert_eq!(CallLog::count(&browser.calls.compose_closed), 1);
}

#[tokio::test]
async fn test_structured_value_wins_over_text() {
    init_logger();
    let browser = FakeBrowser::new([(
        "john.doe@example.org",
        Script::card(SAMPLE_CARD).with_structured(FieldKind::FullName, "John Doe"),
    )]);

    let record = run_one(&browser, "john.doe@example.org").await;

    assert_eq!(record.field(FieldKind::FullName), Some("John Doe"));
    assert_eq!(
        record.fields.provenance_of(FieldKind::FullName),
        Provenance::Structured
    );
}

#[tokio::test]
async fn test_unresolved_recipient_is_not_found() {
    init_logger();
    let browser = FakeBrowser::new([("ghost@example.org", Script::missing())]);

    let record = run_one(&browser, "ghost@example.org").await;

    assert_eq!(record.status, ContactStatus::NotFound);
    assert!(record.fields.is_empty());
    assert!(record.error_detail.is_none());
    assert_eq!(CallLog::count(&browser.calls.cards_opened), 0);
    // compose is still discarded
    assert_eq!(CallLog::count(&browser.calls.compose_closed), 1);
}

#[tokio::test]
async fn test_hanging_card_becomes_error_and_closes_compose() {
    init_logger();
    let browser = FakeBrowser::new([("slow@example.org", Script::hanging_card())]);

    let record = run_one(&browser, "slow@example.org").await;

    assert_eq!(record.status, ContactStatus::Error);
    let detail = record.error_detail.clone().unwrap_or_default();
    assert!(detail.contains("open_card"), "detail was {:?}", detail);
    assert_eq!(CallLog::count(&browser.calls.cards_closed), 1);
    assert_eq!(CallLog::count(&browser.calls.compose_closed), 1);
}

#[tokio::test]
async fn test_card_without_text_is_popup_timeout() {
    init_logger();
    let mut script = Script::card("");
    script.card_text = None;
    let browser = FakeBrowser::new([("blank@example.org", script)]);

    let record = run_one(&browser, "blank@example.org").await;

    assert_eq!(record.status, ContactStatus::Error);
    let detail = record.error_detail.unwrap_or_default();
    assert!(detail.contains("did not become visible"), "detail was {:?}", detail);
    assert_eq!(CallLog::count(&browser.calls.compose_closed), 1);
}

#[tokio::test]
async fn test_card_with_nothing_usable_is_not_found() {
    init_logger();
    let browser = FakeBrowser::new([("bare@example.org", Script::card("---"))]);

    let record = run_one(&browser, "bare@example.org").await;

    assert_eq!(record.status, ContactStatus::NotFound);
    for kind in FieldKind::ALL {
        assert_eq!(record.fields.provenance_of(kind), Provenance::Absent);
    }
}

#[tokio::test]
async fn test_full_name_equal_to_identifier_still_succeeds() {
    init_logger();
    let browser = FakeBrowser::new([(
        "jdoe@example.org",
        Script::card("jdoe@example.org").with_structured(FieldKind::FullName, "jdoe@example.org"),
    )]);

    let record = run_one(&browser, "jdoe@example.org").await;

    assert_eq!(record.status, ContactStatus::Success);
    assert_eq!(record.field(FieldKind::FullName), Some("jdoe@example.org"));
    assert_eq!(
        record.fields.provenance_of(FieldKind::FullName),
        Provenance::Structured
    );
    assert!(record.error_detail.is_none());
}

#[tokio::test]
async fn test_slow_typing_of_long_address_is_not_a_timeout() {
    init_logger();
    let browser = FakeBrowser::new([(LONG_ADDRESS, Script::card(SAMPLE_CARD))]);
    // 52 keys at 5 ms each outlast the 100 ms compose bound on their own
    let pacer = SteadyTypist {
        per_key: Duration::from_millis(5),
        declares_allowance: true,
    };

    let record = run_paced(&browser, &pacer, LONG_ADDRESS).await;

    assert_eq!(record.status, ContactStatus::Success);
    assert!(record.error_detail.is_none());
    assert_eq!(browser.calls.typed(), vec![LONG_ADDRESS]);
}

#[tokio::test]
async fn test_typing_beyond_declared_allowance_times_out() {
    init_logger();
    let browser = FakeBrowser::new([(LONG_ADDRESS, Script::card(SAMPLE_CARD))]);
    let pacer = SteadyTypist {
        per_key: Duration::from_millis(5),
        declares_allowance: false,
    };

    let record = run_paced(&browser, &pacer, LONG_ADDRESS).await;

    assert_eq!(record.status, ContactStatus::Error);
    let detail = record.error_detail.unwrap_or_default();
    assert!(detail.contains("type_recipient"), "detail was {:?}", detail);
    assert_eq!(CallLog::count(&browser.calls.compose_closed), 1);
}
