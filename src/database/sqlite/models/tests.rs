use chrono::Utc;

use super::*;

fn sample_document(tags: &str) -> Document {
    let now = Utc::now().naive_utc();
    Document {
        id: 1,
        slug: "sample-post".to_string(),
        title: "Sample Post".to_string(),
        summary: "A sample".to_string(),
        body: "Body text".to_string(),
        tags: tags.to_string(),
        starred: false,
        published: true,
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn tag_list_decodes_json() {
    let document = sample_document(r#"["rust","wasm"]"#);
    assert_eq!(
        document.tag_list(),
        vec!["rust".to_string(), "wasm".to_string()]
    );
}

#[test]
fn tag_list_tolerates_malformed_json() {
    let document = sample_document("not json at all");
    assert!(document.tag_list().is_empty());

    let document = sample_document("");
    assert!(document.tag_list().is_empty());
}

#[test]
fn recommendation_item_list_decodes_json() {
    let items = vec![RelatedItem {
        slug: "other-post".to_string(),
        title: "Other Post".to_string(),
        summary: "Another sample".to_string(),
        tags: vec!["rust".to_string()],
        starred: true,
        score: 0.9134,
    }];
    let now = Utc::now().naive_utc();
    let record = RecommendationRecord {
        id: 1,
        slug: "sample-post".to_string(),
        items: serde_json::to_string(&items).expect("items serialize"),
        created_at: now,
        updated_at: now,
    };

    let decoded = record.item_list();
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].slug, "other-post");
    assert_eq!(decoded[0].score, 0.9134);
}

#[test]
fn recommendation_item_list_tolerates_malformed_json() {
    let now = Utc::now().naive_utc();
    let record = RecommendationRecord {
        id: 1,
        slug: "sample-post".to_string(),
        items: "{broken".to_string(),
        created_at: now,
        updated_at: now,
    };

    assert!(record.item_list().is_empty());
}
