//! bimprint validate command - check a mesh before printing.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use bimprint_mesh::{Mesh, ThicknessEstimate, ValidationReport, validate_for_printing};

use crate::{Cli, OutputFormat, output};

#[derive(Serialize)]
struct ValidationResult {
    path: String,
    vertices: usize,
    faces: usize,
    printable: bool,
    min_thickness: f64,
    issues: Vec<IssueInfo>,
    report: ValidationReport,
}

#[derive(Serialize)]
struct IssueInfo {
    category: String,
    message: String,
    severity: String,
}

pub fn run(input: &Path, samples: usize, min_thickness: f64, cli: &Cli) -> Result<()> {
    let mesh =
        Mesh::load(input).with_context(|| format!("Failed to load mesh from {:?}", input))?;
    let report = validate_for_printing(&mesh, samples)?;

    let issues = collect_issues(&report, min_thickness);
    let printable = report.is_printable(min_thickness);

    let result = ValidationResult {
        path: input.display().to_string(),
        vertices: mesh.vertex_count(),
        faces: mesh.face_count(),
        printable,
        min_thickness,
        issues,
        report,
    };

    match cli.output_format {
        OutputFormat::Json => {
            output::print(&result, cli.output_format, cli.quiet);
        }
        OutputFormat::Text => {
            if !cli.quiet {
                println!("{}", "Validation Report".bold().underline());
                println!("  {}: {}", "File".cyan(), input.display());
                println!(
                    "  {}: {} vertices, {} faces",
                    "Mesh".cyan(),
                    result.vertices,
                    result.faces
                );

                if result.printable {
                    println!("  {}: {}", "Status".cyan(), "Printable".green().bold());
                } else {
                    println!("  {}: {}", "Status".cyan(), "Issues found".red().bold());
                }

                let b = &result.report.bounding_box;
                println!(
                    "  {}: {:.2} x {:.2} x {:.2} mm",
                    "Size".cyan(),
                    b[3] - b[0],
                    b[4] - b[1],
                    b[5] - b[2]
                );
                println!("  {}: {:.2} mm³", "Volume".cyan(), result.report.volume);
                println!(
                    "  {}: {}",
                    "Min wall".cyan(),
                    describe_thickness(&result.report.min_wall_thickness)
                );

                if !result.issues.is_empty() {
                    println!("\n{}", "Issues:".bold());
                    for issue in &result.issues {
                        let icon = match issue.severity.as_str() {
                            "error" => "✗".red(),
                            "warning" => "⚠".yellow(),
                            _ => "ℹ".blue(),
                        };
                        println!("  {} [{}] {}", icon, issue.category, issue.message);
                    }
                }
            }
        }
    }

    // Exit with error code if not printable
    if !result.printable {
        std::process::exit(1);
    }

    Ok(())
}

fn collect_issues(report: &ValidationReport, min_thickness: f64) -> Vec<IssueInfo> {
    let mut issues = Vec::new();

    if !report.is_watertight {
        issues.push(IssueInfo {
            category: "topology".to_string(),
            message: "Mesh is not watertight".to_string(),
            severity: "error".to_string(),
        });
    }

    if !report.has_correct_normals {
        issues.push(IssueInfo {
            category: "winding".to_string(),
            message: "Face winding is inconsistent".to_string(),
            severity: "error".to_string(),
        });
    }

    let thickness = report.min_wall_thickness.value();
    if thickness < min_thickness {
        issues.push(IssueInfo {
            category: "thickness".to_string(),
            message: format!(
                "Thinnest wall {:.2} mm is below {:.2} mm",
                thickness, min_thickness
            ),
            severity: "error".to_string(),
        });
    }

    if matches!(report.min_wall_thickness, ThicknessEstimate::Approximate(_)) {
        issues.push(IssueInfo {
            category: "thickness".to_string(),
            message: "No opposite walls were hit; thickness approximated from edge lengths"
                .to_string(),
            severity: "warning".to_string(),
        });
    }

    issues
}

fn describe_thickness(estimate: &ThicknessEstimate) -> String {
    match estimate {
        ThicknessEstimate::Exact(v) => format!("{:.2} mm", v),
        ThicknessEstimate::Approximate(v) => format!("~{:.2} mm (approximate)", v),
    }
}
