//! CLI tool for statement PDF to table conversion

use statement_tables::render::{to_csv, to_json_rows, to_markdown};
use statement_tables::{process_pdf, LayoutConfig, TableExtractor};
use std::env;
use std::process;

#[derive(Clone, Copy, PartialEq)]
enum Format {
    Json,
    Csv,
    Markdown,
}

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} <pdf_file> [--json|--csv|--markdown] [--config cfg.json]", program);
    eprintln!();
    eprintln!("Reconstructs the transaction table of every page of a text-based PDF.");
    process::exit(1);
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }

    let pdf_path = &args[1];
    let mut format = Format::Markdown;
    let mut config_path: Option<&String> = None;

    let mut rest = args[2..].iter();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--json" => format = Format::Json,
            "--csv" => format = Format::Csv,
            "--markdown" => format = Format::Markdown,
            "--config" => match rest.next() {
                Some(path) => config_path = Some(path),
                None => usage(&args[0]),
            },
            other => {
                eprintln!("Unknown argument: {}", other);
                usage(&args[0]);
            }
        }
    }

    let config = match config_path {
        Some(path) => match LayoutConfig::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading config {}: {}", path, e);
                process::exit(1);
            }
        },
        None => LayoutConfig::default(),
    };

    let extractor = match TableExtractor::new(&config) {
        Ok(extractor) => extractor,
        Err(e) => {
            eprintln!("Invalid config: {}", e);
            process::exit(1);
        }
    };

    let result = match process_pdf(pdf_path, &extractor) {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    if format == Format::Markdown {
        println!("File: {}", pdf_path);
        println!("Pages: {}", result.page_count);
        println!("Processing time: {}ms", result.processing_time_ms);
    }

    for report in &result.pages {
        let page_table = match &report.outcome {
            Ok(page_table) => page_table,
            Err(e) => {
                eprintln!("page {}: {}", report.page + 1, e);
                continue;
            }
        };
        if page_table.table.is_empty() {
            continue;
        }

        let rendered = match format {
            Format::Json => to_json_rows(&page_table.table),
            Format::Csv => to_csv(&page_table.table),
            Format::Markdown => Ok(to_markdown(&page_table.table)),
        };
        match rendered {
            Ok(text) => {
                if format == Format::Markdown {
                    println!();
                    println!("--- Page {} ---", report.page + 1);
                    println!();
                }
                println!("{}", text.trim_end());
            }
            Err(e) => {
                eprintln!("page {}: {}", report.page + 1, e);
                process::exit(1);
            }
        }

        for rejection in &page_table.rejected_anchors {
            eprintln!(
                "page {}: rejected amount {:?} ({:?})",
                report.page + 1,
                rejection.text,
                rejection.reason
            );
        }
        if !page_table.unassigned.is_empty() {
            eprintln!(
                "page {}: {} spans outside every column",
                report.page + 1,
                page_table.unassigned.len()
            );
        }
    }
}
