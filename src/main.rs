use std::{env, path::PathBuf, process};

use vrm_exporter::{
    ExportOptions, init_logging, inspect_vrm, load_scene_snapshot, rip_vrm, write_vrm,
    export::load_export_options,
};

const USAGE: &str = "Usage:
  vrm-exporter export <scene.json> <output.vrm> [options.json]
  vrm-exporter rip <input.vrm> [output_dir]
  vrm-exporter inspect <input.vrm>";

fn main() {
    init_logging();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("export") if (3..=4).contains(&args.len()) => {
            export(&args[1], &args[2], args.get(3).map(String::as_str))
        }
        Some("rip") if (2..=3).contains(&args.len()) => {
            let output = rip_vrm(
                &PathBuf::from(&args[1]),
                args.get(2).map(PathBuf::from).as_deref(),
            )?;
            println!("Wrote {}", output.display());
            Ok(())
        }
        Some("inspect") if args.len() == 2 => {
            let report = inspect_vrm(&PathBuf::from(&args[1]))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        _ => {
            eprintln!("{USAGE}");
            process::exit(2);
        }
    }
}

fn export(scene_path: &str, output_path: &str, options_path: Option<&str>) -> anyhow::Result<()> {
    let scene = load_scene_snapshot(&PathBuf::from(scene_path))?;
    let options = match options_path {
        Some(path) => load_export_options(&PathBuf::from(path))?,
        None => ExportOptions::default(),
    };

    let report = write_vrm(&scene, &options, &PathBuf::from(output_path))?;

    println!("VRM version: {}", report.vrm_version);
    println!(
        "Nodes: {}, Meshes: {}, Skins: {}",
        report.node_count, report.mesh_count, report.skin_count
    );
    println!(
        "Materials: {}, Images: {}",
        report.material_count, report.image_count
    );
    println!(
        "Vertices: {}, Triangles: {}",
        report.total_vertices, report.total_triangles
    );
    println!("Binary: {} bytes", report.binary_length);
    if !report.issues.is_empty() {
        println!("Warnings: {}", report.issues.len());
        for issue in &report.issues {
            println!("  [{}] {}", issue.code, issue.message);
        }
    }

    Ok(())
}
