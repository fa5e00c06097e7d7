//! End-to-end catalog → bus → consumer flows against in-memory stores.

mod common;

use common::{event_types, TestApp};
use trailmart_core::{
    BasketRepository, Decimal, Error, IntegrationEventKind, ProductRepository, ShoppingCart,
    ShoppingCartItem,
};

fn cart_for(user_id: &str, product_id: i64, quantity: i32) -> ShoppingCart {
    ShoppingCart {
        user_id: user_id.to_string(),
        items: vec![ShoppingCartItem {
            product_id,
            product_name: "whatever the client sent".to_string(),
            price: Decimal::new(1, 0),
            quantity,
        }],
    }
}

#[tokio::test]
async fn test_create_enriches_and_price_change_patches_basket() {
    let mut app = TestApp::new().await;

    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    assert_eq!(product.base_price, Decimal::new(100, 0));

    let events = app.deliver_pending().await;
    assert_eq!(event_types(&events), vec!["ProductCreated"]);

    let enriched = app.catalog_repo.fetch(product.id).await.unwrap().unwrap();
    assert_eq!(enriched.tag_names(), vec!["camping", "shelter", "tent"]);
    assert!(app.backend.generate_json_call_count() >= 1);
    let vector = app.index.get(product.id).expect("vector upserted");
    assert_eq!(vector.name, "Tent");
    assert_eq!(vector.price, Decimal::new(100, 0));

    // Client prices are ignored; the catalog price is resolved.
    let cart = app
        .state
        .baskets
        .update(cart_for("alice", product.id, 2))
        .await
        .unwrap();
    assert_eq!(cart.items[0].price, Decimal::new(100, 0));
    assert_eq!(cart.items[0].product_name, "Tent");
    assert_eq!(cart.total_price(), Decimal::new(200, 0));

    app.state
        .catalog
        .update(product.id, app.tent_request(120))
        .await
        .unwrap()
        .expect("product exists");

    let events = app.deliver_pending().await;
    assert_eq!(event_types(&events), vec!["ProductUpdated", "ProductPriceChanged"]);
    match &events[1].kind {
        IntegrationEventKind::ProductPriceChanged {
            price, image_url, ..
        } => {
            assert_eq!(*price, Decimal::new(120, 0));
            assert_eq!(image_url, "https://img.example.com/tent.jpg");
        }
        other => panic!("unexpected {other:?}"),
    }

    let patched = app.basket_repo.get("alice").await.unwrap().unwrap();
    assert_eq!(patched.items[0].price, Decimal::new(120, 0));
    assert_eq!(patched.items[0].quantity, 2);

    // The update refreshed the vector projection as well.
    assert_eq!(app.index.get(product.id).unwrap().price, Decimal::new(120, 0));
}

#[tokio::test]
async fn test_update_without_price_change_publishes_only_updated() {
    let mut app = TestApp::new().await;
    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    app.drain_events();

    let mut request = app.tent_request(100);
    request.name = "Tent XL".to_string();
    app.state.catalog.update(product.id, request).await.unwrap();

    assert_eq!(event_types(&app.drain_events()), vec!["ProductUpdated"]);
}

#[tokio::test]
async fn test_update_missing_product_returns_none() {
    let mut app = TestApp::new().await;
    let result = app.state.catalog.update(999, app.tent_request(10)).await.unwrap();
    assert!(result.is_none());
    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn test_validation_rejections_persist_nothing() {
    let mut app = TestApp::new().await;

    let mut no_variants = app.tent_request(100);
    no_variants.variants.clear();
    let err = app.state.catalog.create(no_variants).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let mut free = app.tent_request(0);
    free.variants[0].sku = "T0".to_string();
    let err = app.state.catalog.create(free).await.unwrap_err();
    assert!(err.to_string().contains("T0"));

    let mut two_primaries = app.tent_request(100);
    let primary = two_primaries.images[0].clone();
    two_primaries.images.push(primary);
    assert!(matches!(
        app.state.catalog.create(two_primaries).await.unwrap_err(),
        Error::Validation(_)
    ));

    let mut bad_category = app.tent_request(100);
    bad_category.category_id = 4242;
    let err = app.state.catalog.create(bad_category).await.unwrap_err();
    assert!(err.to_string().contains("4242"));

    assert_eq!(app.catalog_repo.product_count(), 0);
    assert!(app.drain_events().is_empty());
}

#[tokio::test]
async fn test_display_price_is_cheapest_variant() {
    let app = TestApp::new().await;
    let mut request = app.tent_request(150);
    let mut cheaper = request.variants[0].clone();
    cheaper.sku = "T1-S".to_string();
    cheaper.price = Decimal::new(8999, 2);
    request.variants.push(cheaper);

    let product = app.state.catalog.create(request).await.unwrap();
    assert_eq!(product.base_price, Decimal::new(8999, 2));
}

#[tokio::test]
async fn test_delete_removes_vector_but_keeps_baskets() {
    let mut app = TestApp::new().await;
    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    app.deliver_pending().await;
    app.state
        .baskets
        .update(cart_for("bob", product.id, 1))
        .await
        .unwrap();
    assert!(app.index.get(product.id).is_some());

    assert!(app.state.catalog.delete(product.id).await.unwrap());
    let events = app.deliver_pending().await;
    assert_eq!(event_types(&events), vec!["ProductDeleted"]);
    assert!(app.index.get(product.id).is_none());

    // The cached basket is untouched, but re-resolving it fails loudly.
    let cached = app.basket_repo.get("bob").await.unwrap().unwrap();
    assert_eq!(cached.items.len(), 1);
    let err = app.state.baskets.update(cached.clone()).await.unwrap_err();
    assert!(matches!(err, Error::ProductNotFound(id) if id == product.id));
    assert_eq!(app.basket_repo.get("bob").await.unwrap().unwrap(), cached);

    assert!(!app.state.catalog.delete(product.id).await.unwrap());
}

#[tokio::test]
async fn test_price_change_prunes_stale_index_entries() {
    let mut app = TestApp::new().await;
    let tent = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    let mut stove_request = app.tent_request(40);
    stove_request.name = "Stove".to_string();
    stove_request.variants[0].sku = "S1".to_string();
    let stove = app.state.catalog.create(stove_request).await.unwrap();
    app.drain_events();

    app.state
        .baskets
        .update(cart_for("carol", tent.id, 1))
        .await
        .unwrap();
    // Carol swaps the tent for a stove behind the index's back.
    app.basket_repo.store_unindexed(cart_for("carol", stove.id, 1));

    let patched = app
        .state
        .baskets
        .apply_price_change(tent.id, Decimal::new(130, 0))
        .await
        .unwrap();
    assert_eq!(patched, 0);
    assert!(app.basket_repo.indexed_users(tent.id).is_empty());

    let cart = app.basket_repo.get("carol").await.unwrap().unwrap();
    assert_eq!(cart.items[0].product_id, stove.id);
    assert_eq!(cart.items[0].price, Decimal::new(1, 0));
}

#[tokio::test]
async fn test_ai_rich_description_on_update() {
    let mut app = TestApp::new().await;
    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    app.deliver_pending().await;

    let mut request = app.tent_request(100);
    request.use_ai_generated_rich_description = true;
    app.state.catalog.update(product.id, request).await.unwrap();
    app.deliver_pending().await;

    let stored = app.catalog_repo.fetch(product.id).await.unwrap().unwrap();
    assert_eq!(
        stored.rich_description.as_deref(),
        Some("A roomy three-season tent for two.")
    );
    assert!(stored.is_rich_description_ai_generated);
}

#[tokio::test]
async fn test_enrichment_keeps_description_edited_during_generation() {
    let mut app = TestApp::new().await;
    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    app.drain_events();

    // Enrichment works from this snapshot while the merchant edits the product.
    let mut snapshot = app.catalog_repo.fetch(product.id).await.unwrap().unwrap();
    let mut edit = app.tent_request(100);
    edit.rich_description = Some("Hand-written by the merchant.".to_string());
    app.state.catalog.update(product.id, edit).await.unwrap();

    app.state
        .enricher
        .process_new_product(&mut snapshot, true, true)
        .await
        .unwrap();

    let stored = app.catalog_repo.fetch(product.id).await.unwrap().unwrap();
    assert_eq!(
        stored.rich_description.as_deref(),
        Some("Hand-written by the merchant.")
    );
    assert!(!stored.is_rich_description_ai_generated);
    assert_eq!(stored.tag_names(), vec!["camping", "shelter", "tent"]);
}

#[tokio::test]
async fn test_failed_enrichment_is_redelivered() {
    let backend = common::default_backend().with_fail_next(1);
    let mut app = TestApp::build(backend, Default::default()).await;
    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();

    app.deliver_pending().await;

    let stored = app.catalog_repo.fetch(product.id).await.unwrap().unwrap();
    assert_eq!(stored.tag_names(), vec!["camping", "shelter", "tent"]);
    assert!(app.index.get(product.id).is_some());
}

#[tokio::test]
async fn test_basket_rejects_non_positive_quantity() {
    let app = TestApp::new().await;
    let product = app.state.catalog.create(app.tent_request(100)).await.unwrap();
    let err = app
        .state
        .baskets
        .update(cart_for("dave", product.id, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(app.basket_repo.get("dave").await.unwrap().is_none());
}
