//! Cart sync across storage tiers against a fake Firestore.

use nogalim_core::{Cart, Location, Price, QuantityChange, UserId};
use nogalim_integration_tests::{FakeFirestore, closed_addr};
use nogalim_storefront::CartStore;
use nogalim_storefront::config::FirestoreConfig;
use nogalim_storefront::storage::{
    DocumentStore, FirestoreStore, JsonFileStorage, KeyValueStorage, MemoryStorage,
};
use serde_json::{Value, json};

type Store = CartStore<MemoryStorage, JsonFileStorage, FirestoreStore>;

fn firestore(base_url: &str) -> FirestoreStore {
    let config = FirestoreConfig::for_project("nogalim-test").with_base_url(base_url);
    FirestoreStore::new(&config).expect("Failed to build Firestore client")
}

fn device(dir: &tempfile::TempDir, name: &str, base_url: &str) -> Store {
    let persistent = JsonFileStorage::open(dir.path().join(format!("{name}.json")))
        .expect("Failed to open persistent storage");
    CartStore::new(MemoryStorage::new(), persistent, firestore(base_url))
}

fn uid(s: &str) -> UserId {
    UserId::parse(s).expect("valid user id")
}

fn summary(cart: &Cart) -> Vec<(String, u32)> {
    cart.items()
        .iter()
        .map(|i| (i.name.clone(), i.quantity))
        .collect()
}

#[tokio::test]
async fn test_guest_cart_merges_into_saved_cart_on_login() {
    let fake = FakeFirestore::new();
    let base_url = fake.start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    // Saved from another device, written the way the web client does it.
    let Value::Object(fields) = json!({
        "cart": { "arrayValue": { "values": [
            { "mapValue": { "fields": {
                "id": { "integerValue": "1700000000001" },
                "name": { "stringValue": "Walnuts" },
                "price": { "integerValue": "120" },
                "quantity": { "integerValue": "2" }
            } } },
            { "mapValue": { "fields": {
                "id": { "integerValue": "1700000000002" },
                "name": { "stringValue": "Dates" },
                "price": { "doubleValue": 45.5 },
                "quantity": { "integerValue": "1" }
            } } }
        ] } },
        "location": { "mapValue": { "fields": {
            "lat": { "doubleValue": 30.0 },
            "lon": { "doubleValue": 31.0 }
        } } }
    }) else {
        unreachable!()
    };
    fake.put_fields("u1", fields);

    let mut store = device(&dir, "laptop", &base_url);
    store.add("Walnuts", Price::from_units(120), None);
    store.add("Figs", Price::from_units(60), None);

    store.on_login(uid("u1")).await;
    store.flush_remote().await;

    let expected = vec![
        ("Walnuts".to_string(), 3),
        ("Dates".to_string(), 1),
        ("Figs".to_string(), 1),
    ];
    assert_eq!(summary(store.cart()), expected);

    // Remote cart replaced, location untouched.
    let saved = store
        .remote()
        .fetch(&uid("u1"))
        .await
        .expect("fetch")
        .expect("document exists");
    assert_eq!(summary(&saved.cart.expect("cart")), expected);
    assert_eq!(saved.location, Some(Location::new(30.0, 31.0)));

    // Persistent tier written to disk for the user.
    let reopened = JsonFileStorage::open(dir.path().join("laptop.json")).expect("reopen");
    let persisted: Cart = serde_json::from_str(
        &reopened
            .get_item("nog_cart_v1_u1")
            .expect("persistent cart"),
    )
    .expect("valid cart json");
    assert_eq!(summary(&persisted), expected);
}

#[tokio::test]
async fn test_cart_follows_user_across_devices() {
    let fake = FakeFirestore::new();
    let base_url = fake.start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut phone = device(&dir, "phone", &base_url);
    // Overlapping remote writes are unordered, so settle each one.
    phone.on_login(uid("u2")).await;
    phone.flush_remote().await;
    let id = phone.add("Pistachios", Price::from_units(200), None);
    phone.flush_remote().await;
    phone.set_quantity(id, QuantityChange::Increment);
    phone.flush_remote().await;
    phone.save_location(Location::new(31.2, 29.9));
    phone.flush_remote().await;

    let mut laptop = device(&dir, "laptop", &base_url);
    laptop.on_login(uid("u2")).await;
    laptop.flush_remote().await;

    assert_eq!(summary(laptop.cart()), [("Pistachios".to_string(), 2)]);
    assert_eq!(laptop.snapshot().totals.total, rust_decimal::Decimal::from(450));

    let fields = fake.fields("u2").expect("document written");
    assert!(fields.contains_key("cart"));
    assert!(fields.contains_key("location"));
}

#[tokio::test]
async fn test_logout_then_login_restores_remote_cart() {
    let fake = FakeFirestore::new();
    let base_url = fake.start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut store = device(&dir, "kiosk", &base_url);
    store.on_login(uid("u3")).await;
    store.flush_remote().await;
    store.add("Almonds", Price::from_units(90), None);
    store.flush_remote().await;

    store.on_logout();
    assert!(store.cart().is_empty());
    assert!(
        store
            .session_storage()
            .get_item("nog_cart_session_u3")
            .is_none()
    );
    assert!(
        store
            .persistent_storage()
            .get_item("nog_cart_v1_u3")
            .is_some()
    );

    store.on_login(uid("u3")).await;
    store.flush_remote().await;
    assert_eq!(summary(store.cart()), [("Almonds".to_string(), 1)]);
}

#[tokio::test]
async fn test_unreachable_remote_keeps_guest_cart() {
    let addr = closed_addr().await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut store = device(&dir, "offline", &format!("http://{addr}/v1"));
    store.add("Cashews", Price::from_units(150), None);

    store.on_login(uid("u4")).await;
    store.flush_remote().await;

    assert_eq!(summary(store.cart()), [("Cashews".to_string(), 1)]);
    assert!(
        store
            .session_storage()
            .get_item("nog_cart_session_u4")
            .is_some()
    );
}

#[tokio::test]
async fn test_remote_errors_do_not_roll_back_local_changes() {
    let fake = FakeFirestore::new();
    let base_url = fake.start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut store = device(&dir, "flaky", &base_url);
    store.on_login(uid("u5")).await;
    store.flush_remote().await;

    fake.set_fail(true);
    store.add("Hazelnuts", Price::from_units(110), None);
    store.flush_remote().await;

    assert_eq!(store.cart().len(), 1);
    let remote_cart = &fake.fields("u5").expect("document")["cart"];
    assert_eq!(remote_cart, &json!({ "arrayValue": { "values": [] } }));
}

#[tokio::test]
async fn test_foreign_fields_do_not_hide_saved_cart() {
    let fake = FakeFirestore::new();
    let base_url = fake.start().await;
    let dir = tempfile::tempdir().expect("tempdir");

    let Value::Object(fields) = json!({
        "cart": { "arrayValue": { "values": [
            { "mapValue": { "fields": {
                "id": { "integerValue": "1700000000003" },
                "name": { "stringValue": "Raisins" },
                "price": { "integerValue": "35" },
                "quantity": { "integerValue": "4" }
            } } }
        ] } },
        "avatar": { "bytesValue": "AAE=" }
    }) else {
        unreachable!()
    };
    fake.put_fields("u6", fields);

    let mut store = device(&dir, "tablet", &base_url);
    store.add("Figs", Price::from_units(60), None);
    store.on_login(uid("u6")).await;
    store.flush_remote().await;

    assert_eq!(
        summary(store.cart()),
        [("Raisins".to_string(), 4), ("Figs".to_string(), 1)]
    );
    let stored = fake.fields("u6").expect("document");
    assert!(stored.contains_key("avatar"));
}
