use auth_proxy::config::ProxyConfig;
use auth_proxy::headers::{compute_outbound_headers, filter_session_cookies};
use auth_proxy::router::{AuthPath, RouteMatcher};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use http::HeaderMap;
use url::Url;

fn benchmark_filter_session_cookies(c: &mut Criterion) {
    let cookie = "_ga=GA1.1.123; theme=dark; __Secure-neon-auth.session_token=abc123; \
                  __Secure-neon-auth.session_data=xyz; locale=en-US; csrf=deadbeef";

    c.bench_function("filter_session_cookies", |b| {
        b.iter(|| black_box(filter_session_cookies(black_box(cookie))))
    });
}

fn benchmark_compute_outbound_headers(c: &mut Criterion) {
    let mut headers = HeaderMap::new();
    headers.insert(
        "cookie",
        "theme=dark; __Secure-neon-auth.session_token=abc123; locale=en-US"
            .parse()
            .unwrap(),
    );
    headers.insert("referer", "https://app.example.com/dashboard".parse().unwrap());
    headers.insert("user-agent", "Mozilla/5.0".parse().unwrap());
    headers.insert("authorization", "Bearer token".parse().unwrap());
    headers.insert("x-custom", "dropped".parse().unwrap());
    let url = Url::parse("https://app.example.com/api/auth/get-session").unwrap();

    c.bench_function("compute_outbound_headers", |b| {
        b.iter(|| black_box(compute_outbound_headers(black_box(&headers), black_box(&url))))
    });
}

fn benchmark_auth_path(c: &mut Criterion) {
    c.bench_function("auth_path_parse", |b| {
        b.iter(|| {
            black_box(AuthPath::from_request_path(
                "/api/auth",
                black_box("/api/auth/organization/get-full-organization"),
            ))
        })
    });
}

fn benchmark_guard_matcher_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("guard_matcher_scale");

    for num_routes in [10, 50, 100, 500].iter() {
        let patterns: Vec<String> = (0..*num_routes)
            .map(|i| format!("/app{}/*rest", i))
            .collect();
        let matcher = RouteMatcher::new(&patterns).expect("Failed to create matcher");

        group.bench_with_input(
            BenchmarkId::from_parameter(num_routes),
            num_routes,
            |b, &_num| b.iter(|| black_box(matcher.matches("/app5/settings/billing"))),
        );
    }
    group.finish();
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
version: 1
server:
  host: "0.0.0.0"
  port: 8080
auth:
  base_url: "https://auth.example.com/neondb/auth"
  prefix: "/api/auth"
guard:
  login_url: "/auth/sign-in"
  matched_routes: ["/dashboard", "/account/*rest"]
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(ProxyConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_filter_session_cookies,
    benchmark_compute_outbound_headers,
    benchmark_auth_path,
    benchmark_guard_matcher_scale,
    benchmark_config_parsing
);
criterion_main!(benches);
