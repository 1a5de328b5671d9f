mod common;

use common::*;
use wildaware::assets;
use wildaware::store::{AnimalCatalog, ObjectStore};

#[tokio::test]
async fn test_upload_tree_keys() -> anyhow::Result<()> {
    let source = tempfile::TempDir::new()?;
    let buckets = tempfile::TempDir::new()?;
    save_png(&source.path().join("Raton laveur").join("paw 1.png"), 20, 20);
    save_png(&source.path().join("Loup").join("a.png"), 20, 20);
    std::fs::write(source.path().join("Loup").join("notes.txt"), "skip me")?;
    let store = LocalObjectStore::new(buckets.path());

    let stats = assets::upload_tree(&store, "Empreintes", source.path()).await?;

    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.succeeded, 2);
    assert!(buckets.path().join("Empreintes/Raton_laveur/paw_1.png").exists());
    assert!(buckets.path().join("Empreintes/Loup/a.png").exists());
    assert!(!buckets.path().join("Empreintes/Loup/notes.txt").exists());
    Ok(())
}

#[tokio::test]
async fn test_upload_failures_are_counted() -> anyhow::Result<()> {
    let source = tempfile::TempDir::new()?;
    create_class_tree(source.path(), &[("Ours", 3)]);

    let stats = assets::upload_tree(&FailingStore, "Empreintes", source.path()).await?;

    assert_eq!(stats.attempted, 3);
    assert_eq!(stats.failed, 3);
    assert!(assets::check_bucket_access(&FailingStore, "Empreintes").await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_link_footprints_skips_unknown_species() -> anyhow::Result<()> {
    let tree = tempfile::TempDir::new()?;
    create_class_tree(tree.path(), &[("Loup", 2), ("Dragon", 1)]);
    let (catalog, _db_dir) = create_test_catalog(&["Renard", "Loup"]).await;
    let store = LocalObjectStore::new(tree.path()).with_public_base("https://project.test");

    let structure = assets::local_structure(tree.path())?;
    let stats = assets::link_footprints(&catalog, &catalog, &store, "Empreintes", &structure).await;

    assert_eq!(stats.inserted, 2);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.skipped_folders, vec!["Dragon".to_string()]);

    let footprints = catalog.footprints().await?;
    assert_eq!(footprints.len(), 2);
    assert_eq!(
        footprints[0].image_url,
        "https://project.test/storage/v1/object/public/Empreintes/Loup/img_00.png"
    );
    assert!(footprints.iter().all(|f| f.animal_id == footprints[0].animal_id));
    Ok(())
}

#[tokio::test]
async fn test_remote_etl_normalizes_into_destination() -> anyhow::Result<()> {
    let buckets = tempfile::TempDir::new()?;
    let source = buckets.path().join("Dirty_Footprint");
    save_png(&source.join("Lynx").join("one.png"), 300, 200);
    save_png(&source.join("Lynx").join("two.png"), 50, 80);
    std::fs::write(source.join("Lynx").join("bad.jpg"), b"corrupt")?;
    save_png(&source.join("stray.png"), 10, 10);
    let store = LocalObjectStore::new(buckets.path());

    let stats = assets::run_remote_etl(&store, "Dirty_Footprint", "Empreintes", 224).await;

    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.total_success, 2);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.by_folder["Lynx"].failed, 1);

    let out = store.download("Empreintes", "Lynx/one.png").await?;
    let img = image::load_from_memory(&out)?;
    assert_eq!((img.width(), img.height()), (224, 224));
    assert_eq!(image::guess_format(&out)?, image::ImageFormat::Jpeg);
    Ok(())
}

#[tokio::test]
async fn test_link_from_bucket_listing_restores_spaces() -> anyhow::Result<()> {
    let source = tempfile::TempDir::new()?;
    let buckets = tempfile::TempDir::new()?;
    save_png(&source.path().join("Raton laveur").join("a.png"), 20, 20);
    save_png(&source.path().join("Loup").join("b.png"), 20, 20);
    let (catalog, _db_dir) = create_test_catalog(&["Loup", "Raton laveur"]).await;
    let store = LocalObjectStore::new(buckets.path());

    assets::upload_tree(&store, "Empreintes", source.path()).await?;
    let structure = assets::bucket_structure(&store, "Empreintes").await?;
    assert_eq!(structure.keys().collect::<Vec<_>>(), vec!["Loup", "Raton_laveur"]);

    let stats = assets::link_footprints(&catalog, &catalog, &store, "Empreintes", &structure).await;

    assert_eq!(stats.inserted, 2);
    assert!(stats.skipped_folders.is_empty());
    let raccoon = catalog.animal_id("Raton laveur").await?.expect("seeded species");
    let footprints = catalog.footprints().await?;
    assert!(
        footprints
            .iter()
            .any(|f| f.animal_id == raccoon && f.image_url.ends_with("/Empreintes/Raton_laveur/a.png"))
    );
    Ok(())
}
