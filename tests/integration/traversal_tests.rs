//! End-to-end traversal against catalog fixtures

use crate::support::{
    hits, hotels_in, html, link, mount_page, next_link, property_card, read_output, test_config,
};
use atlas_walker::config::Config;
use atlas_walker::{AtlasError, FailureKind, Orchestrator, StageKind};
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Two regions, each owning one country whose listing spans two pages
async fn mount_two_region_catalog(server: &MockServer) {
    mount_page(
        server,
        "/region.html",
        &format!(
            "{}{}",
            link("/region/bb/south-coast.html", "South Coast"),
            link("/region/aa/north-coast.html", "North Coast")
        ),
    )
    .await;

    for (code, region, country) in [("aa", "north-coast", "Aland"), ("bb", "south-coast", "Bland")] {
        mount_page(
            server,
            &format!("/region/{}/{}.html", code, region),
            &link(&format!("/country/{}.html", code), country),
        )
        .await;

        mount_page(
            server,
            &format!("/country/{}.html", code),
            &hotels_in(&format!("/list/{}-1.html", code), country),
        )
        .await;

        mount_page(
            server,
            &format!("/list/{}-1.html", code),
            &format!(
                "{}{}{}",
                property_card(&format!("/hotel/{}/one.html", code), "Hotel One"),
                property_card(&format!("/hotel/{}/two.html", code), "Hotel Two"),
                next_link(&format!("/list/{}-2.html", code))
            ),
        )
        .await;

        mount_page(
            server,
            &format!("/list/{}-2.html", code),
            &format!(
                "{}{}",
                property_card(&format!("/hotel/{}/two.html?aid=9", code), "Hotel Two"),
                property_card(&format!("/hotel/{}/three.html", code), "Hotel Three")
            ),
        )
        .await;
    }
}

fn listing_names(country: &Value) -> Vec<&str> {
    country["listings"]
        .as_array()
        .expect("listings array")
        .iter()
        .map(|listing| listing["name"].as_str().unwrap())
        .collect()
}

async fn run(config: Config) -> atlas_walker::output::RunSummary {
    Orchestrator::new(config)
        .expect("orchestrator should build")
        .run()
        .await
        .expect("run should succeed")
}

#[tokio::test]
async fn test_two_regions_end_to_end() {
    let server = MockServer::start().await;
    mount_two_region_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("hierarchy.json");
    let summary = run(test_config(&server.uri(), &output)).await;

    let doc = read_output(&output);
    let regions = doc.as_array().unwrap();
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[0]["name"], "North Coast");
    assert_eq!(regions[1]["name"], "South Coast");

    for (region, country) in regions.iter().zip(["Aland", "Bland"]) {
        let countries = region["countries"].as_array().unwrap();
        assert_eq!(countries.len(), 1);
        assert_eq!(countries[0]["name"], country);
        assert!(countries[0].get("error").is_none());
        assert_eq!(
            listing_names(&countries[0]),
            vec!["Hotel One", "Hotel Two", "Hotel Three"]
        );
    }

    assert_eq!(
        regions[0]["countries"][0]["listings"][0]["url"],
        format!("{}/hotel/aa/one.html", server.uri())
    );

    assert_eq!(summary.regions, 2);
    assert_eq!(summary.countries, 2);
    assert_eq!(summary.listings, 6);
    assert_eq!(summary.total_failures(), 0);
    assert!(!summary.cancelled);
}

#[tokio::test]
async fn test_output_is_byte_identical_across_runs() {
    let server = MockServer::start().await;
    mount_two_region_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    run(test_config(&server.uri(), &first)).await;
    run(test_config(&server.uri(), &second)).await;

    assert_eq!(
        std::fs::read(&first).unwrap(),
        std::fs::read(&second).unwrap()
    );
}

#[tokio::test]
async fn test_failed_country_is_contained() {
    let server = MockServer::start().await;

    let regions: Vec<String> = ["aa", "bb", "cc"]
        .iter()
        .map(|code| link(&format!("/region/{}/coast.html", code), &format!("Region {}", code)))
        .collect();
    mount_page(&server, "/region.html", &regions.concat()).await;

    for code in ["aa", "bb", "cc"] {
        mount_page(
            &server,
            &format!("/region/{}/coast.html", code),
            &link(&format!("/country/{}.html", code), &format!("Country {}", code)),
        )
        .await;
        if code == "bb" {
            Mock::given(method("GET"))
                .and(path("/country/bb.html"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;
            continue;
        }
        mount_page(
            &server,
            &format!("/country/{}.html", code),
            &hotels_in(&format!("/list/{}.html", code), code),
        )
        .await;
        mount_page(
            &server,
            &format!("/list/{}.html", code),
            &property_card(&format!("/hotel/{}/only.html", code), "Only Hotel"),
        )
        .await;
    }

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let summary = run(test_config(&server.uri(), &output)).await;

    let doc = read_output(&output);
    let countries: Vec<&Value> = doc
        .as_array()
        .unwrap()
        .iter()
        .map(|region| &region["countries"][0])
        .collect();

    assert_eq!(countries.len(), 3);
    assert_eq!(listing_names(countries[0]), vec!["Only Hotel"]);
    assert_eq!(countries[1]["error"], "not found (HTTP 404)");
    assert!(listing_names(countries[1]).is_empty());
    assert_eq!(listing_names(countries[2]), vec!["Only Hotel"]);

    assert_eq!(summary.failures.get("not_found"), Some(&1));
    assert_eq!(summary.failed_branches, 1);
}

#[tokio::test]
async fn test_root_failure_aborts_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/region.html"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let result = Orchestrator::new(test_config(&server.uri(), &output))
        .unwrap()
        .run()
        .await;

    match result {
        Err(AtlasError::RootUnavailable { kind, .. }) => {
            assert!(matches!(kind, FailureKind::ExhaustedRetries { attempts: 3, .. }));
        }
        other => panic!("expected root failure, got {:?}", other.map(|s| s.regions)),
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn test_shared_country_fetched_once_and_grafted() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/region.html",
        &format!(
            "{}{}",
            link("/region/aa/east.html", "East"),
            link("/region/aa/west.html", "West")
        ),
    )
    .await;
    mount_page(&server, "/region/aa/east.html", &link("/country/aa.html", "Aland")).await;
    mount_page(&server, "/region/aa/west.html", &link("/country/aa.html", "Aland")).await;
    mount_page(&server, "/country/aa.html", &hotels_in("/list/aa.html", "Aland")).await;
    mount_page(
        &server,
        "/list/aa.html",
        &property_card("/hotel/aa/one.html", "Hotel One"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    run(test_config(&server.uri(), &output)).await;

    assert_eq!(hits(&server, "/country/aa.html").await, 1);
    assert_eq!(hits(&server, "/list/aa.html").await, 1);

    let doc = read_output(&output);
    for region in doc.as_array().unwrap() {
        assert_eq!(region["countries"][0]["name"], "Aland");
        assert_eq!(listing_names(&region["countries"][0]), vec!["Hotel One"]);
    }
}

#[tokio::test]
async fn test_pagination_cycle_is_guarded() {
    let server = MockServer::start().await;

    mount_page(&server, "/region.html", &link("/region/aa/loop.html", "Loop")).await;
    mount_page(&server, "/region/aa/loop.html", &link("/country/aa.html", "Aland")).await;
    mount_page(&server, "/country/aa.html", &hotels_in("/list/p1.html", "Aland")).await;
    mount_page(
        &server,
        "/list/p1.html",
        &format!("{}{}", property_card("/hotel/aa/one.html", "One"), next_link("/list/p2.html")),
    )
    .await;
    mount_page(
        &server,
        "/list/p2.html",
        &format!("{}{}", property_card("/hotel/aa/two.html", "Two"), next_link("/list/p1.html")),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let summary = run(test_config(&server.uri(), &output)).await;

    let country = &read_output(&output)[0]["countries"][0];
    assert_eq!(listing_names(country), vec!["One", "Two"]);
    assert!(country["error"].as_str().unwrap().starts_with("pagination loop"));
    assert_eq!(summary.failures.get("cycle_guard"), Some(&1));
    assert_eq!(hits(&server, "/list/p1.html").await, 1);
}

#[tokio::test]
async fn test_page_cap_and_region_limit() {
    let server = MockServer::start().await;
    mount_two_region_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let mut config = test_config(&server.uri(), &output);
    config.crawler.max_regions = 1;
    config.crawler.max_pages = 1;
    run(config).await;

    let doc = read_output(&output);
    let regions = doc.as_array().unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0]["name"], "South Coast");
    assert_eq!(
        listing_names(&regions[0]["countries"][0]),
        vec!["Hotel One", "Hotel Two"]
    );
    assert_eq!(hits(&server, "/list/bb-2.html").await, 0);
    assert_eq!(hits(&server, "/region/aa/north-coast.html").await, 0);
}

#[tokio::test]
async fn test_search_url_synthesized_without_browse_link() {
    let server = MockServer::start().await;

    mount_page(&server, "/region.html", &link("/region/aa/coast.html", "Coast")).await;
    mount_page(&server, "/region/aa/coast.html", &link("/country/aa.html", "Aland")).await;
    mount_page(&server, "/country/aa.html", "<p>No links here</p>").await;
    Mock::given(method("GET"))
        .and(path("/searchresults.html"))
        .and(query_param("ss", "Aland"))
        .and(query_param("lang", "en-us"))
        .respond_with(html(&property_card("/hotel/aa/found.html", "Found Hotel")))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    run(test_config(&server.uri(), &output)).await;

    let country = &read_output(&output)[0]["countries"][0];
    assert_eq!(listing_names(country), vec!["Found Hotel"]);
}

#[tokio::test]
async fn test_empty_listing_is_flagged() {
    let server = MockServer::start().await;

    mount_page(&server, "/region.html", &link("/region/aa/coast.html", "Coast")).await;
    mount_page(&server, "/region/aa/coast.html", &link("/country/aa.html", "Aland")).await;
    mount_page(&server, "/country/aa.html", &hotels_in("/list/aa.html", "Aland")).await;
    mount_page(&server, "/list/aa.html", "<div>Layout changed</div>").await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let summary = run(test_config(&server.uri(), &output)).await;

    let country = &read_output(&output)[0]["countries"][0];
    assert!(listing_names(country).is_empty());
    assert_eq!(country["error"], "no records matched any extraction rule");
    assert_eq!(summary.failures.get("extraction_empty"), Some(&1));
}

/// One region, one country, whose listing entry point `/list/aa.html` is empty
async fn mount_empty_listing(server: &MockServer, browse: &str) {
    mount_page(server, "/region.html", &link("/region/aa/coast.html", "Coast")).await;
    mount_page(server, "/region/aa/coast.html", &link("/country/aa.html", "Aland")).await;
    mount_page(server, "/country/aa.html", &hotels_in(browse, "Aland")).await;
    mount_page(server, "/list/aa.html", "<div>Layout changed</div>").await;
}

#[tokio::test]
async fn test_empty_offset_chain_is_flagged() {
    let server = MockServer::start().await;
    mount_empty_listing(&server, "/list/aa.html?offset=0").await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let summary = run(test_config(&server.uri(), &output)).await;

    let country = &read_output(&output)[0]["countries"][0];
    assert!(listing_names(country).is_empty());
    assert_eq!(country["error"], "no records matched any extraction rule");
    assert_eq!(summary.failures.get("extraction_empty"), Some(&1));
}

#[tokio::test]
async fn test_empty_single_page_chain_is_flagged() {
    let server = MockServer::start().await;
    mount_empty_listing(&server, "/list/aa.html").await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let mut config = test_config(&server.uri(), &output);
    config.crawler.max_pages = 1;
    let summary = run(config).await;

    let country = &read_output(&output)[0]["countries"][0];
    assert!(listing_names(country).is_empty());
    assert_eq!(country["error"], "no records matched any extraction rule");
    assert_eq!(summary.failures.get("extraction_empty"), Some(&1));
    assert_eq!(hits(&server, "/list/aa.html").await, 1);
}

#[tokio::test]
async fn test_country_limit_applies_after_dedup() {
    let server = MockServer::start().await;

    mount_page(&server, "/region.html", &link("/region/aa/coast.html", "Coast")).await;
    mount_page(
        &server,
        "/region/aa/coast.html",
        &format!(
            "{}{}{}{}",
            link("/country/aa.html", "Aland"),
            link("/country/aa.html?aid=7", "Aland"),
            link("/country/bb.html", "Bland"),
            link("/country/cc.html", "Cland")
        ),
    )
    .await;
    for code in ["aa", "bb"] {
        mount_page(
            &server,
            &format!("/country/{}.html", code),
            &hotels_in(&format!("/list/{}.html", code), code),
        )
        .await;
        mount_page(
            &server,
            &format!("/list/{}.html", code),
            &property_card(&format!("/hotel/{}/inn.html", code), "Inn"),
        )
        .await;
    }

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let mut config = test_config(&server.uri(), &output);
    config.crawler.max_countries = 2;
    let summary = run(config).await;

    let countries = read_output(&output)[0]["countries"].clone();
    let names: Vec<&str> = countries
        .as_array()
        .unwrap()
        .iter()
        .map(|country| country["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Aland", "Bland"]);
    assert_eq!(summary.countries, 2);
    assert_eq!(hits(&server, "/country/aa.html").await, 1);
    assert_eq!(hits(&server, "/country/cc.html").await, 0);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_by_orchestrator() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");

    let mut config = test_config("https://catalog.example.com", &output);
    config.identity.user_agents.clear();
    assert!(matches!(
        Orchestrator::new(config),
        Err(AtlasError::Config(_))
    ));

    let mut config = test_config("https://catalog.example.com", &output);
    config.fetch.delay_min_ms = 10;
    config.fetch.delay_max_ms = 5;
    assert!(matches!(
        Orchestrator::new(config),
        Err(AtlasError::Config(_))
    ));
}

#[tokio::test]
async fn test_region_without_country_is_flagged() {
    let server = MockServer::start().await;

    mount_page(
        &server,
        "/region.html",
        &format!(
            "{}{}",
            link("/region/aa/coast.html", "Coast"),
            link("/region/lost.html", "Lost")
        ),
    )
    .await;
    mount_page(&server, "/region/aa/coast.html", &link("/country/aa.html", "Aland")).await;
    mount_page(&server, "/region/lost.html", "<p>Nothing</p>").await;
    mount_page(&server, "/country/aa.html", &hotels_in("/list/aa.html", "Aland")).await;
    mount_page(&server, "/list/aa.html", &property_card("/hotel/aa/x.html", "X")).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    run(test_config(&server.uri(), &output)).await;

    let doc = read_output(&output);
    let lost = doc
        .as_array()
        .unwrap()
        .iter()
        .find(|region| region["name"] == "Lost")
        .unwrap();
    assert_eq!(lost["error"], "no records matched any extraction rule");
    assert!(lost["countries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_cities_deployment() {
    let server = MockServer::start().await;

    mount_page(&server, "/region.html", &link("/region/aa/coast.html", "Coast")).await;
    mount_page(&server, "/region/aa/coast.html", &link("/country/aa.html", "Aland")).await;
    mount_page(
        &server,
        "/country/aa.html",
        r#"
        <div data-test-id="top-cities">
          <a class="bui-card" href="/city/aa/alpha.html">
            <div class="bui-card__image-container"><img src="/img/alpha.jpg"></div>
            <div class="bui-card__content">
              <h3 class="bui-card__title">Alpha</h3>
              <h4 class="bui-card__subtitle">12 properties</h4>
            </div>
          </a>
        </div>
        <div data-test-id="top-regions">
          <a class="bui-card" href="/region/aa/hills.html">
            <div class="bui-card__content"><h3 class="bui-card__title">Hills</h3></div>
          </a>
        </div>
        "#,
    )
    .await;
    mount_page(&server, "/city/aa/alpha.html", &hotels_in("/list/alpha.html", "Alpha")).await;
    mount_page(
        &server,
        "/list/alpha.html",
        &property_card("/hotel/aa/alpha-inn.html", "Alpha Inn"),
    )
    .await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let mut config = test_config(&server.uri(), &output);
    config.crawler.stages = vec![
        StageKind::Regions,
        StageKind::Countries,
        StageKind::Cities,
        StageKind::Listings,
    ];
    let summary = run(config).await;

    let country = &read_output(&output)[0]["countries"][0];
    assert!(country.get("listings").is_none());
    assert_eq!(country["cities"][0]["name"], "Alpha");
    assert_eq!(country["cities"][0]["about"], "12 properties");
    assert_eq!(country["cities"][0]["image"], "/img/alpha.jpg");
    assert_eq!(listing_names(&country["cities"][0]), vec!["Alpha Inn"]);
    assert_eq!(country["popular_regions"][0]["name"], "Hills");

    assert_eq!(summary.cities, 1);
    assert_eq!(summary.popular_regions, 1);
    assert_eq!(summary.listings, 1);
}

#[tokio::test]
async fn test_cancelled_run_still_writes_output() {
    let server = MockServer::start().await;
    mount_two_region_catalog(&server).await;

    let dir = TempDir::new().unwrap();
    let output = dir.path().join("out.json");
    let orchestrator = Orchestrator::new(test_config(&server.uri(), &output)).unwrap();
    orchestrator.cancel_flag().cancel();

    let summary = orchestrator.run().await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.failures.get("cancelled"), Some(&2));
    let doc = read_output(&output);
    assert_eq!(doc.as_array().unwrap().len(), 2);
    assert_eq!(doc[0]["error"], "cancelled before it was issued");
    assert_eq!(hits(&server, "/region/aa/north-coast.html").await, 0);
}
