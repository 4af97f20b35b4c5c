//! Rendering and batch assembly benchmarks.
//!
//! Every cycle renders each fetched item and joins the blocks into one
//! message. Batches are small in steady state but a relay that was down for a
//! day can come back to hundreds of notifications at once.
//!
//! # Groups
//!
//! | Group | What it measures |
//! |-------|-----------------|
//! | `strip_markup` | HTML to text on short and long status bodies |
//! | `render` | One Mastodon notification, one weather report |
//! | `assemble` | Header + N blocks + footer, N in {1, 40, 400} |
//!
//! # Viewing results
//!
//! ```sh
//! cargo bench --bench render_bench
//! open target/criterion/report/index.html
//! ```

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use relay::feeds::mastodon::{Account, Notification, Status};
use relay::feeds::{MastodonRenderer, WeatherRenderer, WeatherReport};
use relay::notify::render::strip_markup;
use relay::notify::{BatchFormat, Renderer};
use std::hint::black_box;

fn notification(id: u64, html: &str) -> Notification {
    Notification {
        id: id.to_string(),
        kind: "mention".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        account: Account {
            username: "alice".to_string(),
            acct: "alice@example.social".to_string(),
            display_name: "Alice".to_string(),
        },
        status: Some(Status {
            content: html.to_string(),
            spoiler_text: String::new(),
        }),
    }
}

fn long_status() -> String {
    let mut html = String::new();
    for i in 0..40 {
        html.push_str(&format!(
            "<p>Paragraph {i} with a <a href=\"https://example.social/tags/rust\">#rust</a> tag, \
             <span class=\"h-card\"><a href=\"https://example.social/@bob\">@<span>bob</span></a></span> \
             and an entity &amp; another &#8212; here.<br/>Second line.</p>"
        ));
    }
    html
}

// ---------------------------------------------------------------------------
// strip_markup
// ---------------------------------------------------------------------------

fn strip_markup_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("strip_markup");
    let short = "<p>hey <b>you</b> &amp; everyone</p>".to_string();
    let long = long_status();

    for (name, html) in [("short", &short), ("long_40_paragraphs", &long)] {
        group.throughput(Throughput::Bytes(html.len() as u64));
        group.bench_with_input(BenchmarkId::new(name, ""), html, |b, html| {
            b.iter(|| black_box(strip_markup(black_box(html))))
        });
    }

    group.finish();
}

// ---------------------------------------------------------------------------
// Renderers
// ---------------------------------------------------------------------------

fn render_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(1));

    let mention = notification(101, "<p>hey <b>you</b></p>");
    group.bench_function("mastodon_mention", |b| {
        b.iter(|| black_box(MastodonRenderer.render(black_box(&mention))))
    });

    let report = WeatherReport {
        id: "20240115180000".to_string(),
        reported_at: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        report_time: "2024-01-15 18:00:00".to_string(),
        city: "东城区".to_string(),
        weather: "晴".to_string(),
        temperature: "3".to_string(),
        humidity: "20".to_string(),
        wind_direction: "西北".to_string(),
        wind_power: "≤3".to_string(),
    };
    group.bench_function("weather_live", |b| {
        b.iter(|| black_box(WeatherRenderer.render(black_box(&report))))
    });

    group.finish();
}

// ---------------------------------------------------------------------------
// Batch assembly
// ---------------------------------------------------------------------------

fn assemble_bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let format = BatchFormat::new("You have {count} new Mastodon notifications:")
        .with_footer("See all notifications: https://example.social/notifications");

    for n in [1usize, 40, 400] {
        let blocks: Vec<String> = (0..n as u64)
            .map(|i| MastodonRenderer.render(&notification(i, "<p>short post</p>")))
            .collect();
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &blocks, |b, blocks| {
            b.iter(|| black_box(format.assemble(black_box(blocks))))
        });
    }

    group.finish();
}

criterion_group!(benches, strip_markup_bench, render_bench, assemble_bench);
criterion_main!(benches);
