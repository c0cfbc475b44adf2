pub mod chat {
    pub mod v1 {
        tonic::include_proto!("relaychat.v1");
    }
}
