//! One-shot RPC flows: registration and user listing.

use anyhow::Result;
use relaychat_proto::chat::v1 as pb;
use relaychat_tests::TestServer;
use tonic::Code;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn distinct_names_get_distinct_identities() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = server.client().await?;

    let id1 = client
        .register(pb::RegisterRequest {
            name: "alice".to_string(),
        })
        .await?
        .into_inner()
        .session_id;
    let id2 = client
        .register(pb::RegisterRequest {
            name: "bob".to_string(),
        })
        .await?
        .into_inner()
        .session_id;

    assert!(!id1.is_empty());
    assert_ne!(id1, id2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn duplicate_name_is_rejected() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = server.client().await?;

    client
        .register(pb::RegisterRequest {
            name: "alice".to_string(),
        })
        .await?;
    let err = client
        .register(pb::RegisterRequest {
            name: "alice".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err.code(), Code::InvalidArgument);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn list_users_streams_registered_names() -> Result<()> {
    let server = TestServer::spawn().await?;
    let mut client = server.client().await?;

    for name in ["alice", "bob"] {
        client
            .register(pb::RegisterRequest {
                name: name.to_string(),
            })
            .await?;
    }

    // No credential required for listing.
    let mut stream = client
        .list_users(pb::ListUsersRequest {})
        .await?
        .into_inner();
    let mut names = Vec::new();
    while let Some(entry) = stream.message().await? {
        names.push(entry.name);
    }
    names.sort();
    assert_eq!(names, vec!["alice", "bob"]);
    Ok(())
}
