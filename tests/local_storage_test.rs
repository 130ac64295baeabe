//! End-to-end tests against the local filesystem backend
//!
//! These go through the `Storage` facade the way an application would.

use bytes::Bytes;
use serde_json::json;
use storage_abstraction::{
    AddFileParams, Error, Options, Provider, ResultObject, Storage, StorageConfig,
};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

fn local_url(temp_dir: &TempDir, bucket: Option<&str>) -> String {
    let root = temp_dir.path().join("storage");
    match bucket {
        Some(bucket) => format!("local://{}@{}", root.display(), bucket),
        None => format!("local://{}", root.display()),
    }
}

async fn read_all(storage: &Storage, bucket: &str, file: &str, options: &Options) -> String {
    let mut stream = storage
        .get_file_as_stream(Some(bucket), file, options)
        .await
        .unwrap();
    let mut content = String::new();
    stream.read_to_string(&mut content).await.unwrap();
    content
}

/// create bucket → add file → list → remove twice → stream missing file
#[tokio::test]
async fn test_end_to_end_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let source = temp_dir.path().join("x.jpg");
    std::fs::write(&source, b"not really a jpeg").unwrap();
    let source_len = std::fs::metadata(&source).unwrap().len();

    let storage = Storage::new(local_url(&temp_dir, None)).await.unwrap();
    assert_eq!(storage.provider(), Provider::Local);
    assert_eq!(storage.config_error(), None);

    let created = ResultObject::acknowledge(storage.create_bucket(Some("b1"), &Options::new()).await);
    assert_eq!(serde_json::to_value(&created).unwrap(), json!({"value": "ok", "error": null}));

    let added = ResultObject::acknowledge(
        storage
            .add_file_from_path(AddFileParams::from_path(&source, "y.jpg").bucket("b1"))
            .await,
    );
    assert_eq!(added.value().map(String::as_str), Some("ok"));

    let listed = ResultObject::from(storage.list_files(Some("b1"), None).await);
    assert_eq!(
        serde_json::to_value(&listed).unwrap(),
        json!({"value": [["y.jpg", source_len]], "error": null})
    );

    for _ in 0..2 {
        let removed = ResultObject::acknowledge(storage.remove_file(Some("b1"), "y.jpg").await);
        assert_eq!(removed, ResultObject::ok("ok".to_string()));
    }

    let streamed = ResultObject::from(
        storage
            .get_file_as_stream(Some("b1"), "y.jpg", &Options::new())
            .await
            .map(|_| ()),
    );
    assert_eq!(streamed.value(), None);
    assert_eq!(streamed.error(), Some("No file 'y.jpg' found in bucket 'b1'"));
}

#[tokio::test]
async fn test_selected_bucket_and_explicit_bucket_are_equivalent() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, Some("b1"))).await.unwrap();
    assert_eq!(storage.selected_bucket().as_deref(), Some("b1"));

    storage.create_bucket(None, &Options::new()).await.unwrap();
    for name in ["f.jpg", "g.jpg"] {
        storage
            .add_file_from_buffer(AddFileParams::from_buffer(Bytes::from_static(b"abc"), name))
            .await
            .unwrap();
    }

    let implicit = storage.remove_file(None, "f.jpg").await;
    let explicit = storage.remove_file(Some("b1"), "g.jpg").await;
    assert_eq!(
        ResultObject::acknowledge(implicit),
        ResultObject::acknowledge(explicit)
    );

    let implicit = storage.size_of(None, "missing.jpg").await.unwrap_err();
    let explicit = storage.size_of(Some("b1"), "missing.jpg").await.unwrap_err();
    assert_eq!(implicit.to_string(), explicit.to_string());
}

#[tokio::test]
async fn test_missing_bucket_and_no_selection() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, None)).await.unwrap();

    let err = storage.list_files(None, None).await.unwrap_err();
    assert!(matches!(err, Error::NoBucket));
    assert_eq!(err.to_string(), "Please provide or select a bucket");

    let err = storage.clear_bucket(Some("nope")).await.unwrap_err();
    assert_eq!(err.to_string(), "No bucket 'nope' found");

    let err = storage
        .add_file_from_buffer(AddFileParams::from_buffer(Bytes::from_static(b"x"), "a.txt").bucket("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BucketNotFound(_)));

    assert!(!storage.bucket_exists(Some("nope")).await.unwrap());
    assert!(!storage.file_exists(Some("nope"), "a.txt").await.unwrap());
}

#[tokio::test]
async fn test_missing_source_file_fails_before_the_backend() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, Some("b1"))).await.unwrap();
    // The bucket does not exist either; the source is checked first.
    let err = storage
        .add_file_from_path(AddFileParams::from_path(temp_dir.path().join("gone.jpg"), "y.jpg"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Source { .. }), "unexpected error: {err}");
}

#[tokio::test]
async fn test_add_file_checks_the_source_shape() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, Some("b1"))).await.unwrap();
    storage.create_bucket(None, &Options::new()).await.unwrap();

    let err = storage
        .add_file_from_path(AddFileParams::from_buffer(Bytes::from_static(b"x"), "a.txt"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidOption(_)));

    // The generic entry point accepts every shape.
    storage
        .add_file(AddFileParams::from_buffer(Bytes::from_static(b"x"), "a.txt"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stream_upload_and_ranged_read() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, Some("b1"))).await.unwrap();
    storage.create_bucket(None, &Options::new()).await.unwrap();

    let payload: &'static [u8] = b"0123456789abcdef";
    storage
        .add_file_from_stream(AddFileParams::from_stream(payload, "dir/stream.bin"))
        .await
        .unwrap();
    assert_eq!(storage.size_of(None, "dir/stream.bin").await.unwrap(), 16);

    assert_eq!(
        read_all(&storage, "b1", "dir/stream.bin", &Options::new()).await,
        "0123456789abcdef"
    );

    let mut range = Options::new();
    range.insert("start".to_string(), json!(2));
    range.insert("end".to_string(), json!(5));
    assert_eq!(read_all(&storage, "b1", "dir/stream.bin", &range).await, "2345");

    let mut open_ended = Options::new();
    open_ended.insert("start".to_string(), json!(10));
    assert_eq!(read_all(&storage, "b1", "dir/stream.bin", &open_ended).await, "abcdef");

    let mut to_max = Options::new();
    to_max.insert("end".to_string(), json!(u64::MAX));
    assert_eq!(
        read_all(&storage, "b1", "dir/stream.bin", &to_max).await,
        "0123456789abcdef"
    );

    let mut backwards = Options::new();
    backwards.insert("start".to_string(), json!(5));
    backwards.insert("end".to_string(), json!(2));
    let result = storage
        .get_file_as_stream(None, "dir/stream.bin", &backwards)
        .await;
    assert!(matches!(result, Err(Error::InvalidOption(_))));
}

#[tokio::test]
async fn test_urls() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, Some("b1"))).await.unwrap();
    storage.create_bucket(None, &Options::new()).await.unwrap();
    storage
        .add_file(AddFileParams::from_buffer(Bytes::from_static(b"x"), "y.jpg"))
        .await
        .unwrap();

    assert!(storage.bucket_is_public(None).await.unwrap());
    let public = storage.get_public_url(None, "y.jpg", &Options::new()).await.unwrap();
    assert!(public.ends_with("b1/y.jpg"), "unexpected url: {public}");
    let signed = storage.get_signed_url(None, "y.jpg", &Options::new()).await.unwrap();
    assert_eq!(signed, public);

    let err = storage
        .get_public_url(None, "missing.jpg", &Options::new())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "No file 'missing.jpg' found in bucket 'b1'");

    let err = storage
        .get_presigned_upload_url(None, "new.jpg", &Options::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[tokio::test]
async fn test_bucket_lifecycle() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, Some("b1"))).await.unwrap();
    let options = Options::new();

    storage.create_bucket(None, &options).await.unwrap();
    // Already existing is success.
    storage.create_bucket(Some("b1"), &options).await.unwrap();
    storage.create_bucket(Some("b2"), &options).await.unwrap();
    assert_eq!(storage.list_buckets().await.unwrap(), vec!["b1", "b2"]);

    for name in ["a.txt", "nested/b.txt"] {
        storage
            .add_file(AddFileParams::from_buffer(Bytes::from_static(b"xy"), name))
            .await
            .unwrap();
    }
    assert_eq!(storage.list_files(None, Some(1)).await.unwrap().len(), 1);

    storage.clear_bucket(None).await.unwrap();
    assert!(storage.bucket_exists(None).await.unwrap());
    assert!(storage.list_files(None, None).await.unwrap().is_empty());

    storage.delete_bucket(None).await.unwrap();
    assert_eq!(storage.selected_bucket(), None);
    assert_eq!(storage.list_buckets().await.unwrap(), vec!["b2"]);

    storage.set_selected_bucket(Some("b2"));
    assert!(storage.bucket_exists(None).await.unwrap());
}

#[tokio::test]
async fn test_bucket_sessions_do_not_share_selection() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, None)).await.unwrap();
    let options = Options::new();

    let first = storage.bucket("first");
    let second = storage.bucket("second");
    first.create(&options).await.unwrap();
    second.create(&options).await.unwrap();

    let (a, b) = tokio::join!(
        first.add_file(AddFileParams::from_buffer(Bytes::from_static(b"1"), "one.txt")),
        second.add_file(AddFileParams::from_buffer(Bytes::from_static(b"22"), "two.txt")),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(first.list_files(None).await.unwrap(), vec![("one.txt".to_string(), 1)]);
    assert_eq!(second.list_files(None).await.unwrap(), vec![("two.txt".to_string(), 2)]);
    assert!(!first.file_exists("two.txt").await.unwrap());
    assert_eq!(storage.selected_bucket(), None);
}

#[tokio::test]
async fn test_switch_adapter_starts_fresh() {
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&first_dir, Some("b1"))).await.unwrap();
    storage.create_bucket(None, &Options::new()).await.unwrap();

    storage
        .switch_adapter(StorageConfig::from(local_url(&second_dir, None)))
        .await
        .unwrap();
    assert_eq!(storage.selected_bucket(), None);
    assert!(storage.list_buckets().await.unwrap().is_empty());

    // A broken configuration still switches, and reports itself on every call.
    storage.switch_adapter("local://").await.unwrap();
    let config_error = storage.config_error().unwrap();
    let err = storage.list_buckets().await.unwrap_err();
    assert_eq!(err.to_string(), config_error);

    // Unknown providers are rejected and leave the current adapter in place.
    assert!(storage.switch_adapter("ftp://host").await.is_err());
    assert_eq!(storage.config_error(), Some(config_error));
}

#[tokio::test]
async fn test_name_rejection() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(local_url(&temp_dir, None)).await.unwrap();

    for name in ["null", "undefined", "", "   "] {
        let result = ResultObject::acknowledge(storage.create_bucket(Some(name), &Options::new()).await);
        assert_eq!(result.value(), None, "accepted bucket name {name:?}");
        assert!(result.error().is_some());
    }
    assert!(storage.list_buckets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_names_can_not_escape_the_root() {
    let temp_dir = TempDir::new().unwrap();
    let sibling = temp_dir.path().join("precious.txt");
    std::fs::write(&sibling, b"keep me").unwrap();
    let storage = Storage::new(local_url(&temp_dir, None)).await.unwrap();

    for bucket in ["..", ".", "a/b", "../storage"] {
        let err = storage.list_files(Some(bucket), None).await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)), "{bucket:?}: {err}");
        let err = storage.delete_bucket(Some(bucket)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)), "{bucket:?}: {err}");
    }
    assert!(sibling.exists());

    storage.create_bucket(Some("b1"), &Options::new()).await.unwrap();
    let outside = temp_dir.path().join("outside.txt");
    let target = outside.to_str().unwrap();
    let err = storage
        .add_file_from_buffer(AddFileParams::from_buffer(Bytes::from_static(b"x"), target).bucket("b1"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidName(_)), "{err}");
    assert!(!outside.exists());

    let err = storage.remove_file(Some("b1"), sibling.to_str().unwrap()).await.unwrap_err();
    assert!(matches!(err, Error::InvalidName(_)), "{err}");
    assert!(sibling.exists());
}
