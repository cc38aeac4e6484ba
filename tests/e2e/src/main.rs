fn main() {
    println!("Run `cargo test -p e2e` to execute the end-to-end scenarios.");
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use fileshare_client::{Client, ClientError};
    use fileshare_file_ops::STAGING_DIR;
    use fileshare_protocol::Request;
    use fileshare_protocol::codec::write_request;
    use fileshare_server::{FileServer, ServerConfig};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    const SERVICE: &str = "Lab File Sharing Service";

    struct Running {
        addr: SocketAddr,
        discovery: SocketAddr,
        root: PathBuf,
        cancel: CancellationToken,
        handle: JoinHandle<Result<(), fileshare_server::ServerError>>,
    }

    impl Running {
        async fn stop(self) {
            self.cancel.cancel();
            self.handle.await.unwrap().unwrap();
        }

        async fn client(&self) -> Client<TcpStream> {
            Client::connect(self.addr).await.unwrap()
        }
    }

    async fn start(root: &Path) -> Running {
        let config = ServerConfig {
            shared_dir: root.to_path_buf(),
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            tcp_port: 0,
            discovery_port: Some(0),
            service_name: SERVICE.into(),
            read_timeout: None,
        };
        let server = FileServer::bind(config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let discovery = server.discovery_addr().unwrap();
        let root = server.root().path().to_path_buf();
        let cancel = server.cancel_token();
        let handle = tokio::spawn(server.run());
        Running {
            addr,
            discovery,
            root,
            cancel,
            handle,
        }
    }

    /// Entries left in the staging directory.
    fn staging_entries(root: &Path) -> usize {
        std::fs::read_dir(root.join(STAGING_DIR))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    /// Polls until the staging directory is empty or two seconds pass.
    async fn wait_for_empty_staging(root: &Path) -> bool {
        for _ in 0..200 {
            if staging_entries(root) == 0 {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn pattern(len: usize, seed: u8) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    #[tokio::test]
    async fn notes_scenario() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "hello world").unwrap();
        let server = start(tmp.path()).await;

        let mut client = server.client().await;
        assert_eq!(client.list().await.unwrap(), vec!["notes.txt"]);
        assert_eq!(
            client.get("notes.txt").await.unwrap().as_deref(),
            Some(&b"hello world"[..])
        );
        client.put("copy.txt", b"abc").await.unwrap();
        assert_eq!(client.list().await.unwrap(), vec!["copy.txt", "notes.txt"]);
        client.bye().await.unwrap();

        assert_eq!(std::fs::read(tmp.path().join("copy.txt")).unwrap(), b"abc");
        server.stop().await;
    }

    #[tokio::test]
    async fn put_then_get_is_byte_identical() {
        let tmp = tempfile::tempdir().unwrap();
        let server = start(tmp.path()).await;
        let data = pattern(3 * 1024 * 1024 + 17, 5);

        let mut uploader = server.client().await;
        uploader.put("blob.bin", &data).await.unwrap();

        // A different connection sees the promoted file.
        let mut downloader = server.client().await;
        assert_eq!(downloader.get("blob.bin").await.unwrap(), Some(data));
        assert_eq!(downloader.get("absent.bin").await.unwrap(), None);

        server.stop().await;
    }

    #[tokio::test]
    async fn interrupted_put_leaves_no_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("keep.txt"), "original").unwrap();
        let server = start(tmp.path()).await;

        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        let request = Request::Put {
            name: "keep.txt".into(),
            size: 10_000,
        };
        write_request(&mut raw, &request).await.unwrap();
        raw.write_all(&[b'x'; 1000]).await.unwrap();
        raw.flush().await.unwrap();
        drop(raw);

        assert!(wait_for_empty_staging(&server.root).await);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("keep.txt")).unwrap(),
            "original"
        );

        let mut client = server.client().await;
        assert_eq!(client.list().await.unwrap(), vec!["keep.txt"]);
        server.stop().await;
    }

    #[tokio::test]
    async fn concurrent_put_and_get_never_see_partial_content() {
        let tmp = tempfile::tempdir().unwrap();
        let old = vec![b'a'; 200_000];
        let new = vec![b'b'; 300_000];
        std::fs::write(tmp.path().join("a.txt"), &old).unwrap();
        let server = start(tmp.path()).await;

        let mut writer = server.client().await;
        let payload = new.clone();
        let put = tokio::spawn(async move {
            for _ in 0..5 {
                writer.put("a.txt", &payload).await.unwrap();
            }
        });

        let mut readers = Vec::new();
        for _ in 0..3 {
            let mut reader = server.client().await;
            let (old, new) = (old.clone(), new.clone());
            readers.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let got = reader.get("a.txt").await.unwrap().unwrap();
                    assert!(got == old || got == new, "partial read of {} bytes", got.len());
                }
            }));
        }

        put.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(std::fs::read(tmp.path().join("a.txt")).unwrap(), new);
        server.stop().await;
    }

    #[tokio::test]
    async fn concurrent_same_name_puts_leave_one_complete_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let server = start(tmp.path()).await;

        let payloads: Vec<Vec<u8>> = (0..6u8).map(|i| pattern(100_000 + i as usize, i)).collect();
        let mut tasks = Vec::new();
        for payload in payloads.clone() {
            let mut client = server.client().await;
            tasks.push(tokio::spawn(async move {
                client.put("same.bin", &payload).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stored = std::fs::read(tmp.path().join("same.bin")).unwrap();
        assert!(payloads.contains(&stored));
        assert_eq!(staging_entries(&server.root), 0);

        let mut client = server.client().await;
        assert_eq!(client.list().await.unwrap(), vec!["same.bin"]);
        server.stop().await;
    }

    #[tokio::test]
    async fn traversal_names_touch_nothing_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let share = tmp.path().join("share");
        std::fs::create_dir(&share).unwrap();
        std::fs::write(tmp.path().join("secret.txt"), "outside").unwrap();
        let server = start(&share).await;

        let mut client = server.client().await;
        assert!(client.put("../escape.txt", b"boom").await.is_err());
        assert!(!tmp.path().join("escape.txt").exists());

        let mut client = server.client().await;
        assert!(client.get("../secret.txt").await.is_err());

        // Other sessions are unaffected.
        let mut client = server.client().await;
        assert!(client.list().await.unwrap().is_empty());
        server.stop().await;
    }

    #[tokio::test]
    async fn failed_put_reports_and_session_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let server = start(tmp.path()).await;

        // A regular file in place of the staging directory makes staging fail.
        let staging = server.root.join(STAGING_DIR);
        std::fs::write(&staging, "not a directory").unwrap();

        let mut client = server.client().await;
        let err = client.put("doc.txt", b"payload").await.unwrap_err();
        assert!(matches!(err, ClientError::UploadFailed(name) if name == "doc.txt"));
        assert!(client.list().await.unwrap().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn discovery_probe_gets_one_reply() {
        let tmp = tempfile::tempdir().unwrap();
        let server = start(tmp.path()).await;

        let found = fileshare_discovery::probe(server.discovery, Duration::from_millis(300))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, SERVICE);
        assert_eq!(found[0].addr, server.discovery);

        server.stop().await;
    }

    #[tokio::test]
    async fn shutdown_discards_in_flight_upload() {
        let tmp = tempfile::tempdir().unwrap();
        let server = start(tmp.path()).await;

        let mut raw = TcpStream::connect(server.addr).await.unwrap();
        let request = Request::Put {
            name: "big.bin".into(),
            size: 1 << 30,
        };
        write_request(&mut raw, &request).await.unwrap();
        raw.write_all(&[0u8; 4096]).await.unwrap();
        raw.flush().await.unwrap();

        // Give the session time to open its staging file.
        for _ in 0..200 {
            if staging_entries(&server.root) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let root = server.root.clone();
        server.stop().await;

        assert!(wait_for_empty_staging(&root).await);
        assert!(!root.join("big.bin").exists());
        drop(raw);
    }
}
