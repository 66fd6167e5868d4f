use statement_tables::columns::cluster_anchors;
use statement_tables::rows::group_rows;
use statement_tables::{extract_pages, AnchorValue, LayoutConfig, TableExtractor};
use std::env;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: debug_columns <pdf_path> [max_page | min-max]");
        std::process::exit(1);
    }

    let range = args.get(2).map(|s| s.as_str()).unwrap_or("1-3");
    let (min_page, max_page) = if let Some((a, b)) = range.split_once('-') {
        (a.parse().unwrap_or(1), b.parse().unwrap_or(3))
    } else {
        (1, range.parse().unwrap_or(3))
    };

    let pages = extract_pages(&args[1]).expect("Failed to extract");
    let config = LayoutConfig::default();
    let extractor = TableExtractor::new(&config).expect("Invalid default config");

    for page in pages.iter().filter(|p| (min_page..=max_page).contains(&(p.index + 1))) {
        let analysis = extractor.analyze_page(page);
        println!(
            "=== PAGE {} ({} spans, {:.0}x{:.0}, row tolerance {:.1}) ===",
            page.index + 1,
            page.spans.len(),
            page.width,
            page.height,
            analysis.row_tolerance
        );

        println!("-- headers");
        for h in &analysis.headers {
            println!(
                "  {:<16} x={:7.1} y={:7.1} text={:?}",
                h.keyword, h.anchor_x, h.anchor_y, page.spans[h.span].text
            );
        }

        let body_anchors: Vec<&AnchorValue> = analysis
            .anchors
            .values
            .iter()
            .filter(|a| analysis.body.contains(&a.span))
            .collect();
        println!("-- anchor clusters ({} anchors in body)", body_anchors.len());
        for c in cluster_anchors(&body_anchors, &config) {
            println!(
                "  x={:7.1} [{:7.1}, {:7.1}) members={}",
                c.position,
                c.left,
                c.right,
                c.members.len()
            );
        }
        for r in &analysis.anchors.rejections {
            println!("  rejected {:?}: {:?}", r.text, r.reason);
        }

        println!("-- columns");
        match &analysis.columns {
            Ok(columns) => {
                for c in columns {
                    let kind = if c.is_anchor_governed() { "anchor" } else { "header" };
                    println!("  {:<16} [{:7.1}, {:7.1}) {}", c.id, c.left, c.right, kind);
                }
            }
            Err(e) => println!("  none: {}", e),
        }

        println!("-- rows");
        for row in group_rows(&page.spans, &analysis.body, analysis.row_tolerance) {
            let texts: Vec<&str> = row
                .members
                .iter()
                .map(|&i| page.spans[i].text.as_str())
                .collect();
            println!("  y={:7.1} {:?}", row.y_center, texts);
        }
        println!();
    }
}
