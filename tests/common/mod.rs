//! Common test utilities for cms-dl integration tests

#![allow(dead_code)]

use cms_dl::Config;
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const PAGE_SIZE: u64 = 4;

/// Config pointed at `dir`, with fast retries and no pause between datasets
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.output_dir = dir.join("downloads");
    config.log_dir = dir.join("logs");
    config.fetch.page_size = PAGE_SIZE;
    config.fetch.request_timeout = Duration::from_secs(5);
    config.fetch.delay_between_datasets = Duration::ZERO;
    config.retry.max_attempts = 1;
    config.retry.initial_delay = Duration::from_millis(5);
    config.retry.max_delay = Duration::from_millis(20);
    config.retry.jitter = false;
    config
}

/// Generated row `i` of a dataset
pub fn row(i: u64) -> Value {
    let state = if i % 2 == 0 { "MD" } else { "VA" };
    json!({
        "Rndrng_Prvdr_NPI": format!("{:010}", 1_000_000 + i),
        "Rndrng_Prvdr_State_Abrvtn": state,
        "Tot_Benes": i * 3,
    })
}

/// API path of a dataset on the mock server
pub fn data_path(uuid: &str) -> String {
    format!("/data-api/v1/dataset/{uuid}/data")
}

/// Serve `rows` generated rows for `uuid`, paged by `PAGE_SIZE`
///
/// Each page (including the trailing short or empty one) is expected to be
/// requested exactly once.
pub async fn mount_dataset(server: &MockServer, uuid: &str, rows: u64) {
    let mut offset = 0;
    loop {
        let end = rows.min(offset + PAGE_SIZE);
        let page: Vec<Value> = (offset..end).map(row).collect();
        let short = (page.len() as u64) < PAGE_SIZE;

        Mock::given(method("GET"))
            .and(path(data_path(uuid)))
            .and(query_param("offset", offset.to_string()))
            .and(query_param("size", PAGE_SIZE.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(page))
            .expect(1)
            .mount(server)
            .await;

        if short {
            break;
        }
        offset += PAGE_SIZE;
    }
}

/// Answer every request for `uuid` with `status`
pub async fn mount_failing_dataset(server: &MockServer, uuid: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(data_path(uuid)))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Catalog CSV text in the published layout
pub fn catalog_csv(server: &MockServer, datasets: &[(&str, &str)]) -> String {
    let mut csv = String::from("Title,Description,API URL,UUID,Dataset URL\n");
    for (title, uuid) in datasets {
        csv.push_str(&format!(
            "\"{title}\",\"About {title}\",{}{},{uuid},https://data.cms.gov/d/{uuid}\n",
            server.uri(),
            data_path(uuid),
        ));
    }
    csv
}
