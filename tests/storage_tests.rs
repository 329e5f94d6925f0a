use citizen_sphere::{
    AppError,
    storage::{
        ALLOWED_ATTACHMENT_TYPES, MockStorageService, S3StorageClient, StorageService,
        attachment_key,
    },
};

mod key_tests {
    use super::*;

    #[test]
    fn test_key_keeps_lowercased_extension_only() {
        let key = attachment_key("Pothole On Main St.JPG", "image/jpeg").unwrap();
        assert!(key.starts_with("concerns/"));
        assert!(key.ends_with(".jpg"));
        assert!(!key.contains("Pothole"));
    }

    #[test]
    fn test_key_without_extension_falls_back_to_bin() {
        let key = attachment_key("scan", "application/pdf").unwrap();
        assert!(key.ends_with(".bin"));
    }

    #[test]
    fn test_key_ignores_path_components() {
        let key = attachment_key("../../etc/passwd.png", "image/png").unwrap();
        assert!(!key.contains(".."));
        assert_eq!(key.matches('/').count(), 1);
    }

    #[test]
    fn test_keys_are_unique() {
        let a = attachment_key("a.png", "image/png").unwrap();
        let b = attachment_key("a.png", "image/png").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unsupported_content_type_is_rejected() {
        let err = attachment_key("notes.txt", "text/plain").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_every_allowed_type_is_accepted() {
        for content_type in ALLOWED_ATTACHMENT_TYPES {
            assert!(attachment_key("file.bin", content_type).is_ok());
        }
    }
}

mod mock_tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_success() {
        let mock = MockStorageService::new();
        let key = attachment_key("photo.webp", "image/webp").unwrap();
        let url = mock
            .get_presigned_upload_url(&key, "image/webp")
            .await
            .unwrap();

        assert!(url.contains("signature=fake"));
        assert!(url.contains(&key));
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockStorageService::new_failing();
        let err = mock
            .get_presigned_upload_url("concerns/x.mp4", "video/mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_mock_sanitization() {
        let mock = MockStorageService::new();
        let url = mock
            .get_presigned_upload_url("../../etc/passwd", "image/png")
            .await
            .unwrap();
        assert!(!url.contains(".."));
    }
}

mod s3_tests {
    use super::*;

    // Presigning is computed locally; no MinIO needs to be running.
    #[tokio::test]
    async fn test_s3_presigned_url_format() {
        let client = S3StorageClient::new(
            "http://localhost:9000",
            "us-east-1",
            "testkey",
            "testsecret",
            "testbucket",
        )
        .await;

        let key = attachment_key("report.pdf", "application/pdf").unwrap();
        let url = client
            .get_presigned_upload_url(&key, "application/pdf")
            .await
            .unwrap();

        assert!(url.contains("localhost:9000"));
        assert!(url.contains("testbucket"));
        assert!(url.contains(&key));
        assert!(url.contains("X-Amz-Signature"));
    }
}
