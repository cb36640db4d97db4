use mailsweep::classify::CategoryResolver;
use mailsweep::config::Heuristics;
use mailsweep::storage::Database;

fn resolver(db: &Database) -> CategoryResolver {
    CategoryResolver::new(db.clone(), Heuristics::default(), 0.6)
}

#[tokio::test]
async fn similar_names_reuse_the_existing_category() {
    let db = Database::new_in_memory().await.unwrap();
    let resolver = resolver(&db);

    let first = resolver
        .ensure_category("u1", "Bills & Receipts", "money stuff")
        .await
        .unwrap();
    let second = resolver
        .ensure_category("u1", "bills and receipts", "same thing")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(db.list_categories("u1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn dissimilar_names_create_distinct_categories() {
    let db = Database::new_in_memory().await.unwrap();
    let resolver = resolver(&db);

    let receipts = resolver
        .ensure_category("u1", "Receipts", "")
        .await
        .unwrap();
    let jobs = resolver.ensure_category("u1", "Jobs", "").await.unwrap();

    assert_ne!(receipts.id, jobs.id);
    assert_eq!(db.list_categories("u1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn generic_categories_are_never_fuzzy_reused() {
    let db = Database::new_in_memory().await.unwrap();
    let resolver = resolver(&db);

    let generic = resolver.ensure_category("u1", "test", "").await.unwrap();
    // "Test" normalizes to the same tokens as "test" but generic buckets
    // are excluded from similarity reuse, so a new row appears.
    let fresh = resolver.ensure_category("u1", "Test", "").await.unwrap();

    assert_ne!(generic.id, fresh.id);
}

#[tokio::test]
async fn repeated_ensure_converges_on_one_row() {
    let db = Database::new_in_memory().await.unwrap();
    let resolver = resolver(&db);

    let a = resolver
        .ensure_category("u1", "Shipping", "delivery updates")
        .await
        .unwrap();
    let b = resolver
        .ensure_category("u1", "Shipping", "tracking notifications")
        .await
        .unwrap();

    assert_eq!(a.id, b.id);
    let cats = db.list_categories("u1").await.unwrap();
    assert_eq!(cats.len(), 1);
    // An exact name hit returns the existing row untouched.
    assert_eq!(cats[0].description, "delivery updates");
}

#[tokio::test]
async fn categories_are_scoped_per_user() {
    let db = Database::new_in_memory().await.unwrap();
    let resolver = resolver(&db);

    let u1 = resolver.ensure_category("u1", "Receipts", "").await.unwrap();
    let u2 = resolver.ensure_category("u2", "Receipts", "").await.unwrap();

    assert_ne!(u1.id, u2.id);
    assert_eq!(db.list_categories("u1").await.unwrap().len(), 1);
    assert_eq!(db.list_categories("u2").await.unwrap().len(), 1);
}
