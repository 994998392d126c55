//! End-to-end tests against a real MongoDB server started with Docker.
//!
//! Run with: `cargo test -p mongodict --test mongo_container -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use mongodb::bson::{doc, Document};
use mongodb::sync::Client;
use testcontainers::clients;
use testcontainers::core::WaitFor;
use testcontainers::GenericImage;

use mongodict::prelude::*;

fn mongo_image() -> GenericImage {
    GenericImage::new("mongo", "7")
        .with_exposed_port(27017)
        .with_wait_for(WaitFor::message_on_stdout("Waiting for connections"))
}

fn seed(port: u16) {
    let client = Client::with_uri_str(format!("mongodb://127.0.0.1:{port}")).unwrap();
    let aliases = client.database("mail").collection::<Document>("aliases");
    aliases
        .insert_one(doc! { "email": "alice@example.com", "uid": "1001" })
        .run()
        .unwrap();
    aliases
        .insert_one(doc! { "email": "bob@example.com", "uid": 1002_i64 })
        .run()
        .unwrap();
}

#[test]
#[ignore = "requires docker"]
fn lookups_against_live_server() {
    let docker = clients::Cli::default();
    let node = docker.run(mongo_image());
    let port = node.get_host_port_ipv4(27017);
    seed(port);

    let port = port.to_string();
    let cf = CfFile::from_pairs(
        "live.cf",
        [
            ("host", "127.0.0.1"),
            ("port", port.as_str()),
            ("dbname", "mail"),
            ("collection", "aliases"),
            ("key", "email"),
            ("value", "uid"),
            ("timeout", "5000"),
        ],
    );
    let mut dict = open("live.cf", OpenMode::ReadOnly, &cf, Arc::new(MongoConnector::new()));

    assert_eq!(dict.lookup("alice+news@example.com").unwrap().as_deref(), Some("1001"));
    assert_eq!(dict.lookup("bob@example.com").unwrap().as_deref(), Some("1002"));
    assert_eq!(dict.lookup("nobody@example.com").unwrap(), None);
    dict.close();
}

#[test]
#[ignore = "requires docker"]
fn uri_endpoint_against_live_server() {
    let docker = clients::Cli::default();
    let node = docker.run(mongo_image());
    let port = node.get_host_port_ipv4(27017);
    seed(port);

    let uri = format!("mongodb://127.0.0.1:{port}/?directConnection=true");
    let cf = CfFile::from_pairs(
        "live-uri.cf",
        [
            ("uri", uri.as_str()),
            ("dbname", "mail"),
            ("collection", "aliases"),
            ("key", "email"),
        ],
    );
    let mut dict = MongoDictionary::from_source(
        "live-uri.cf",
        OpenMode::ReadOnly,
        &cf,
        Arc::new(MongoConnector::new()),
    )
    .unwrap();
    dict.connect().unwrap();
    assert_eq!(
        dict.lookup("alice@example.com").unwrap().as_deref(),
        Some("alice@example.com")
    );
}

#[test]
fn unreachable_server_is_retryable() {
    let cf = CfFile::from_pairs(
        "down.cf",
        [
            ("host", "127.0.0.1"),
            ("port", "1"),
            ("dbname", "mail"),
            ("collection", "aliases"),
            ("key", "email"),
            ("timeout", "200"),
        ],
    );
    let started = std::time::Instant::now();
    let mut dict = open("down.cf", OpenMode::ReadOnly, &cf, Arc::new(MongoConnector::new()));
    let err = dict.lookup("alice@example.com").unwrap_err();
    assert_eq!(err.status(), DictStatus::Retry, "got: {err}");
    assert!(started.elapsed() < Duration::from_secs(10));
}
