//! Behaviour every document store adapter must share.

use std::sync::Arc;
use std::time::Duration;

use partkit_store::{
    Collection, CollectionDef, DocumentStore, Field, FindOptions, MemoryStore, Predicate,
    SortingRule, SqlStore, StoreError, Value, Values, Where,
};
use serde_json::json;

fn people_def() -> CollectionDef {
    CollectionDef::new("people")
        .field("name", Field::string().length(80))
        .field("age", Field::integer().size(32).nullable())
        .field("email", Field::string().unique().nullable())
}

fn person(name: &str, age: Option<i64>) -> Values {
    let mut v = Values::new();
    v.insert("name".into(), name.into());
    if let Some(age) = age {
        v.insert("age".into(), Value::Integer(age));
    }
    v
}

async fn memory() -> (Arc<dyn DocumentStore>, Arc<dyn Collection>) {
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let people = store.create_collection(people_def()).await.unwrap();
    (store, people)
}

async fn sqlite() -> (Arc<dyn DocumentStore>, Arc<dyn Collection>) {
    let store = SqlStore::new("sqlite::memory:").unwrap();
    let people = store.create_collection(people_def()).await.unwrap();
    store.connect().await.unwrap();
    (Arc::new(store), people)
}

async fn adapters() -> Vec<(&'static str, Arc<dyn Collection>)> {
    vec![("memory", memory().await.1), ("sqlite", sqlite().await.1)]
}

async fn names(collection: &dyn Collection, options: FindOptions) -> Vec<String> {
    let mut out = Vec::new();
    for doc in collection.find(options).await.unwrap() {
        let values = doc.get().await.unwrap();
        out.push(values["name"].as_str().unwrap().to_string());
    }
    out
}

#[tokio::test]
async fn create_then_get_round_trips_with_generated_id() {
    for (adapter, people) in adapters().await {
        let doc = people.create(person("Matti Korhonen", Some(41))).await.unwrap();
        let values = doc.get().await.unwrap();

        let mut expected = person("Matti Korhonen", Some(41));
        expected.insert("email".into(), Value::Null);
        expected.insert("id".into(), Value::String(doc.id().to_string()));
        assert_eq!(values, expected, "{adapter}");
        assert!(uuid::Uuid::parse_str(doc.id()).is_ok(), "{adapter}");
    }
}

#[tokio::test]
async fn matti_becomes_juha_then_disappears() {
    for (adapter, people) in adapters().await {
        let doc = people.create(person("Matti Korhonen", None)).await.unwrap();
        assert_eq!(doc.get().await.unwrap()["name"], Value::from("Matti Korhonen"));

        doc.update(person("Juha Korhonen", None)).await.unwrap();
        let values = doc.get().await.unwrap();
        assert_eq!(values["name"], Value::from("Juha Korhonen"), "{adapter}");
        assert_eq!(values["id"], Value::String(doc.id().to_string()), "{adapter}");

        doc.delete().await.unwrap();
        assert_eq!(people.count(None).await.unwrap(), 0, "{adapter}");
        assert!(matches!(doc.get().await, Err(StoreError::NotFound { .. })), "{adapter}");
    }
}

#[tokio::test]
async fn age_range_matches_half_open_interval() {
    for (adapter, people) in adapters().await {
        for (name, age) in [("a", Some(17)), ("b", Some(18)), ("c", Some(40)), ("d", Some(64)), ("e", Some(65)), ("f", None)] {
            people.create(person(name, age)).await.unwrap();
        }
        let fields = people.fields();
        let filter = Where::from_json(&fields, &json!({"age": {"gte": 18, "lt": 65}})).unwrap();

        let found = names(
            people.as_ref(),
            FindOptions::new().filter(filter.clone()).order_by(SortingRule::asc("name")),
        )
        .await;
        assert_eq!(found, vec!["b", "c", "d"], "{adapter}");
        assert_eq!(people.count(Some(filter)).await.unwrap(), 3, "{adapter}");
    }
}

#[tokio::test]
async fn null_semantics_match_sql() {
    for (adapter, people) in adapters().await {
        people.create(person("known", Some(30))).await.unwrap();
        people.create(person("unknown", None)).await.unwrap();

        let not_thirty = Where::new().field("age", Predicate::NotEquals(Value::Integer(30)));
        assert_eq!(people.count(Some(not_thirty)).await.unwrap(), 0, "{adapter}");

        let missing = Where::new().field("age", Predicate::IsNull);
        assert_eq!(
            names(people.as_ref(), FindOptions::new().filter(missing)).await,
            vec!["unknown"],
            "{adapter}"
        );

        let equals_null = Where::new().field("age", Predicate::Equals(Value::Null));
        assert_eq!(people.count(Some(equals_null)).await.unwrap(), 1, "{adapter}");
    }
}

#[tokio::test]
async fn like_is_case_sensitive_and_anchored() {
    for (adapter, people) in adapters().await {
        people.create(person("Matti Korhonen", None)).await.unwrap();
        people.create(person("matti virtanen", None)).await.unwrap();

        let like = |p: &str| Where::new().field("name", Predicate::Like(p.into()));
        assert_eq!(people.count(Some(like("Matti%"))).await.unwrap(), 1, "{adapter}");
        assert_eq!(people.count(Some(like("%tti%"))).await.unwrap(), 2, "{adapter}");
        assert_eq!(people.count(Some(like("Korhonen"))).await.unwrap(), 0, "{adapter}");
        assert_eq!(people.count(Some(like("_atti %"))).await.unwrap(), 2, "{adapter}");

        let not_like = Where::new().field("name", Predicate::NotLike("M%".into()));
        assert_eq!(people.count(Some(not_like)).await.unwrap(), 1, "{adapter}");
    }
}

#[tokio::test]
async fn ordering_paging_and_repeatable_reads() {
    for (adapter, people) in adapters().await {
        for (name, age) in [("d", 2), ("a", 1), ("c", 2), ("b", 1)] {
            people.create(person(name, Some(age))).await.unwrap();
        }
        let ordered = FindOptions::new()
            .order_by(SortingRule::desc("age"))
            .order_by(SortingRule::asc("name"));
        assert_eq!(names(people.as_ref(), ordered.clone()).await, vec!["c", "d", "a", "b"], "{adapter}");
        assert_eq!(
            names(people.as_ref(), ordered.clone().offset(1).limit(2)).await,
            vec!["d", "a"],
            "{adapter}"
        );
        assert_eq!(names(people.as_ref(), ordered.offset(3)).await, vec!["b"], "{adapter}");

        let first = names(people.as_ref(), FindOptions::new()).await;
        let second = names(people.as_ref(), FindOptions::new()).await;
        assert_eq!(first, second, "{adapter}");
        assert_eq!(first, vec!["d", "a", "c", "b"], "{adapter}");
    }
}

#[tokio::test]
async fn or_and_composition() {
    for (adapter, people) in adapters().await {
        for (name, age) in [("Aino", 20), ("Eino", 30), ("Ilmari", 40)] {
            people.create(person(name, Some(age))).await.unwrap();
        }
        let filter = Where::from_json(
            &people.fields(),
            &json!({
                "or": [{"name": "Aino"}, {"age": {"gte": 40}}],
                "and": [{"name": {"notIn": ["Ilmari"]}}]
            }),
        )
        .unwrap();
        assert_eq!(
            names(people.as_ref(), FindOptions::new().filter(filter)).await,
            vec!["Aino"],
            "{adapter}"
        );
    }
}

#[tokio::test]
async fn validation_rejects_without_writing() {
    for (adapter, people) in adapters().await {
        let mut bad = person(&"x".repeat(81), Some(1 << 40));
        bad.insert("nickname".into(), "x".into());
        let err = people.create(bad).await.err().unwrap();
        match err {
            StoreError::Validation(e) => {
                let msg = e.to_string();
                assert!(msg.contains("name: length exceeds 80 characters"), "{adapter}: {msg}");
                assert!(msg.contains("age: out of range for 32-bit integer"), "{adapter}: {msg}");
                assert!(msg.contains("nickname: unknown field"), "{adapter}: {msg}");
            }
            other => panic!("{adapter}: unexpected error {other:?}"),
        }
        assert_eq!(people.count(None).await.unwrap(), 0, "{adapter}");
    }
}

#[tokio::test]
async fn unique_violations_are_reported() {
    for (adapter, people) in adapters().await {
        let mut a = person("a", None);
        a.insert("email".into(), "same@example.com".into());
        people.create(a.clone()).await.unwrap();
        let err = people.create(a).await.err().unwrap();
        assert!(
            matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "email"),
            "{adapter}: {err:?}"
        );
    }
}

#[tokio::test]
async fn sql_operations_wait_for_connect() {
    let store = SqlStore::new("sqlite::memory:").unwrap();
    let people = store.create_collection(people_def()).await.unwrap();

    let pending = {
        let people = people.clone();
        tokio::spawn(async move { people.create(person("early", None)).await.map(|d| d.id().to_string()) })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!pending.is_finished());

    store.connect().await.unwrap();
    pending.await.unwrap().unwrap();
    assert_eq!(people.count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn sql_collections_declared_after_connect_are_synced() {
    let store = SqlStore::new("sqlite::memory:").unwrap();
    store.connect().await.unwrap();
    let late = store
        .create_collection(CollectionDef::new("late").field("title", Field::string()))
        .await
        .unwrap();
    let mut v = Values::new();
    v.insert("title".into(), "hello".into());
    let doc = late.create(v).await.unwrap();
    assert_eq!(doc.get().await.unwrap()["title"], Value::from("hello"));
}

#[tokio::test]
async fn sql_round_trips_every_type() {
    let store = SqlStore::new("sqlite::memory:").unwrap();
    let things = store
        .create_collection(
            CollectionDef::new("things")
                .field("flag", Field::boolean())
                .field("ratio", Field::float())
                .field("bytes", Field::blob())
                .field("at", Field::date())
                .field("meta", Field::json())
                .field("owner", Field::reference("people").nullable()),
        )
        .await
        .unwrap();
    store.connect().await.unwrap();

    let at = chrono::DateTime::parse_from_rfc3339("2024-02-29T12:30:00.123456789Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let mut v = Values::new();
    v.insert("flag".into(), true.into());
    v.insert("ratio".into(), 0.5.into());
    v.insert("bytes".into(), vec![0u8, 1, 255].into());
    v.insert("at".into(), at.into());
    v.insert("meta".into(), Value::Json(json!({"tags": ["a"]})));
    let doc = things.create(v.clone()).await.unwrap();

    let mut read = doc.get().await.unwrap();
    read.remove("id");
    v.insert("owner".into(), Value::Null);
    assert_eq!(read, v);

    let later = Where::new().field("at", Predicate::Gt(Value::Date(at - chrono::Duration::seconds(1))));
    assert_eq!(things.count(Some(later)).await.unwrap(), 1);
}

async fn notes(adapter: &str) -> Arc<dyn Collection> {
    let def = CollectionDef::new("notes")
        .field("title", Field::string())
        .field("meta", Field::json());
    match adapter {
        "memory" => MemoryStore::new().create_collection(def).await.unwrap(),
        _ => {
            let store = SqlStore::new("sqlite::memory:").unwrap();
            let notes = store.create_collection(def).await.unwrap();
            store.connect().await.unwrap();
            notes
        }
    }
}

#[tokio::test]
async fn json_fields_compare_alike_in_every_adapter() {
    for adapter in ["memory", "sqlite"] {
        let notes = notes(adapter).await;
        for (title, meta) in [("b", json!({"a": 2})), ("a", json!({"a": 1}))] {
            let mut v = Values::new();
            v.insert("title".into(), title.into());
            v.insert("meta".into(), Value::Json(meta));
            notes.create(v).await.unwrap();
        }

        let other = Where::new().field("meta", Predicate::NotEquals(Value::Json(json!({"a": 2}))));
        assert_eq!(notes.count(Some(other)).await.unwrap(), 1, "{adapter}");
        let same = Where::new().field("meta", Predicate::Equals(Value::Json(json!({"a": 1}))));
        assert_eq!(notes.count(Some(same)).await.unwrap(), 1, "{adapter}");

        let mut titles = Vec::new();
        let options = FindOptions {
            order: vec![SortingRule::asc("meta")],
            ..FindOptions::default()
        };
        for doc in notes.find(options).await.unwrap() {
            titles.push(doc.get().await.unwrap()["title"].as_str().unwrap().to_string());
        }
        assert_eq!(titles, vec!["a", "b"], "{adapter}");
    }
}
