//! Tool availability report.

use console::style;

use scanlayer::document::PopplerLoader;
use scanlayer::ocr::{check_binary, create_backend, OcrBackend, OcrBackendType};
use scanlayer::Settings;

use crate::cli::icons::warn;

pub fn cmd_tools(settings: &Settings) -> anyhow::Result<()> {
    println!("\n{}", style("Extraction Tool Status").bold());
    println!("{}", "-".repeat(50));

    println!("\n{}", style("Document Tools:").cyan());
    let mut all_found = true;
    for tool in PopplerLoader::TOOLS {
        let status = if check_binary(tool) {
            style("✓ found").green()
        } else {
            all_found = false;
            style("✗ not found").red()
        };
        println!("  {:<18} {}", tool, status);
    }

    println!("\n{}", style("OCR Backends:").cyan());
    let backend_config = settings.ocr.backend_config();
    for kind in OcrBackendType::all() {
        let role = if kind.as_str() == settings.ocr.primary {
            " (primary)"
        } else if kind.as_str() == settings.ocr.secondary {
            " (secondary)"
        } else {
            ""
        };
        let label = format!("{}{}", kind, role);

        let backend = if *kind == OcrBackendType::Ocrs && !cfg!(feature = "ocr-ocrs") {
            None
        } else {
            create_backend(kind.as_str(), &backend_config)
        };

        match backend {
            Some(backend) => {
                let backend: &dyn OcrBackend = backend.as_ref();
                let status = if backend.is_available() {
                    style("✓ available").green()
                } else {
                    style("✗ not available").red()
                };
                println!("  {:<18} {}", label, status);
                println!("  {:<18} {}", "", style(backend.availability_hint()).dim());
            }
            None => println!(
                "  {:<18} {}",
                label,
                style("not compiled (enable ocr-ocrs feature)").dim()
            ),
        }
    }

    if !all_found {
        println!(
            "\n{} Some document tools are missing. Install poppler-utils.",
            warn()
        );
    }

    Ok(())
}
