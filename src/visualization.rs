//! Visualization utilities for CVRP solutions.
//!
//! Generates SVG route maps and plain-text exports for plotting.

use crate::instance::CvrpInstance;
use crate::solution::Solution;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Stroke colors cycled over the routes
const ROUTE_COLORS: [&str; 10] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4",
    "#42d4f4", "#f032e6", "#9a6324", "#800000", "#000075",
];

/// SVG visualization generator
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Canvas height
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Customer radius; the depot is drawn larger
    pub node_radius: f64,
    /// Draw node ids next to the nodes
    pub show_labels: bool,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 800.0,
            height: 800.0,
            margin: 50.0,
            node_radius: 5.0,
            show_labels: true,
        }
    }
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route_color(index: usize) -> &'static str {
        ROUTE_COLORS[index % ROUTE_COLORS.len()]
    }

    /// Generate SVG visualization of a solution
    pub fn generate_svg(&self, instance: &CvrpInstance, solution: &Solution) -> String {
        let mut svg = String::new();

        let (min_x, max_x, min_y, max_y) = self.get_bounds(instance);
        let scale_x = (self.width - 2.0 * self.margin) / (max_x - min_x).max(1.0);
        let scale_y = (self.height - 2.0 * self.margin) / (max_y - min_y).max(1.0);
        let scale = scale_x.min(scale_y);

        svg.push_str(&format!(
            r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .customer {{ fill: #ffffff; stroke: #2c3e50; stroke-width: 1.5; }}
    .depot {{ fill: #2c3e50; stroke: #000000; stroke-width: 2; }}
    .route {{ stroke-width: 2; fill: none; stroke-linejoin: round; }}
    .label {{ font-family: Arial; font-size: 9px; fill: #2c3e50; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
            self.width, self.height, self.width, self.height
        ));

        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">Instance: {} | Cost: {} | Routes: {} | Feasible: {}</text>
"##,
            self.margin,
            instance.name,
            solution.cost,
            solution.num_routes(),
            solution.feasible
        ));

        let transform = |x: f64, y: f64| -> (f64, f64) {
            let tx = self.margin + (x - min_x) * scale;
            let ty = self.height - self.margin - (y - min_y) * scale;
            (tx, ty)
        };

        for (r, route) in solution.routes.iter().enumerate() {
            if route.is_depot_only() {
                continue;
            }
            let points: Vec<String> = route
                .nodes
                .iter()
                .chain(std::iter::once(&0))
                .filter(|&&n| n < instance.nodes.len())
                .map(|&n| {
                    let (x, y) = transform(instance.nodes[n].x, instance.nodes[n].y);
                    format!("{:.2},{:.2}", x, y)
                })
                .collect();

            svg.push_str(&format!(
                r##"<polyline points="{}" class="route" stroke="{}"><title>Route {} (load {})</title></polyline>
"##,
                points.join(" "),
                Self::route_color(r),
                r + 1,
                route.load
            ));
        }

        for node in &instance.nodes {
            let (x, y) = transform(node.x, node.y);

            if node.is_depot() {
                let side = 3.0 * self.node_radius;
                svg.push_str(&format!(
                    r##"<rect x="{:.2}" y="{:.2}" width="{}" height="{}" class="depot"/>
"##,
                    x - side / 2.0,
                    y - side / 2.0,
                    side,
                    side
                ));
            } else {
                svg.push_str(&format!(
                    r##"<circle cx="{:.2}" cy="{:.2}" r="{}" class="customer"><title>{} (demand {})</title></circle>
"##,
                    x, y, self.node_radius, node.id, node.demand
                ));
            }

            if self.show_labels {
                svg.push_str(&format!(
                    r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                    x,
                    y - self.node_radius - 3.0,
                    node.id
                ));
            }
        }

        svg.push_str("</svg>");

        svg
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }

    /// Save SVG as PNG.
    ///
    /// Uses `resvg` when built with the `png` feature; otherwise tries
    /// `rsvg-convert`, then `magick convert`, then `inkscape`.
    pub fn save_png<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        render_png(svg, path.as_ref(), self.width as u32, self.height as u32)
    }

    /// Get coordinate bounds
    fn get_bounds(&self, instance: &CvrpInstance) -> (f64, f64, f64, f64) {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for node in &instance.nodes {
            min_x = min_x.min(node.x);
            max_x = max_x.max(node.x);
            min_y = min_y.min(node.y);
            max_y = max_y.max(node.y);
        }

        (min_x, max_x, min_y, max_y)
    }

    /// Export data for external plotting (e.g., matplotlib)
    pub fn export_plot_data(&self, instance: &CvrpInstance, solution: &Solution) -> String {
        let mut data = String::new();

        data.push_str("# CVRP Solution Data\n");
        data.push_str(&format!("# Instance: {}\n", instance.name));
        data.push_str(&format!("# Capacity: {}\n", instance.capacity));
        data.push_str(&format!("# Cost: {}\n", solution.cost));
        data.push_str(&format!("# Feasible: {}\n\n", solution.feasible));

        data.push_str("# Nodes: id, x, y, demand\n");
        for node in &instance.nodes {
            data.push_str(&format!("{},{},{},{}\n", node.id, node.x, node.y, node.demand));
        }

        data.push_str("\n# Routes: load; node ids (depot first)\n");
        for route in &solution.routes {
            let ids: Vec<String> = route.nodes.iter().map(|n| n.to_string()).collect();
            data.push_str(&format!("{};{}\n", route.load, ids.join(",")));
        }

        data
    }
}

#[cfg(feature = "png")]
fn render_png(svg: &str, path: &Path, width: u32, height: u32) -> std::io::Result<()> {
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{self, TreeParsing};

    let other = |msg: String| std::io::Error::new(std::io::ErrorKind::Other, msg);

    let tree = usvg::Tree::from_str(svg, &usvg::Options::default())
        .map_err(|e| other(format!("usvg parse error: {}", e)))?;
    let mut pixmap = Pixmap::new(width.max(1), height.max(1))
        .ok_or_else(|| other("Failed to create pixmap".to_string()))?;
    resvg::render(&tree, resvg::FitTo::Original, Transform::default(), pixmap.as_mut())
        .ok_or_else(|| other("resvg render failed".to_string()))?;
    pixmap
        .save_png(path)
        .map_err(|e| other(format!("save_png failed: {}", e)))
}

#[cfg(not(feature = "png"))]
fn render_png(svg: &str, path: &Path, _width: u32, _height: u32) -> std::io::Result<()> {
    use std::process::Command;

    let tmp_svg = path.with_extension("svg.tmp");
    std::fs::write(&tmp_svg, svg)?;

    let src = tmp_svg.to_string_lossy().into_owned();
    let out = path.to_string_lossy().into_owned();
    let attempts: [(&str, Vec<&str>); 3] = [
        ("rsvg-convert", vec!["-o", out.as_str(), src.as_str()]),
        ("magick", vec!["convert", src.as_str(), out.as_str()]),
        ("inkscape", vec![src.as_str(), "--export-type=png", "--export-filename", out.as_str()]),
    ];

    let converted = attempts.iter().any(|(program, args)| {
        Command::new(program)
            .args(args)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    });

    let _ = std::fs::remove_file(&tmp_svg);
    if converted {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "No SVG->PNG converter succeeded (tried rsvg-convert, magick, inkscape)",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solution::Route;

    fn create_test_instance() -> CvrpInstance {
        CvrpInstance::new(
            "test",
            vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (-10.0, 0.0)],
            vec![0, 4, 4, 4],
            8,
        )
    }

    fn create_test_solution(instance: &CvrpInstance) -> Solution {
        Solution::from_routes(
            instance,
            vec![
                Route::from_customers(instance, &[1, 2]),
                Route::with_customer(instance, 3),
            ],
            "test",
        )
    }

    #[test]
    fn test_visualizer() {
        let instance = create_test_instance();
        let solution = create_test_solution(&instance);

        let viz = Visualizer::new();
        let svg = viz.generate_svg(&instance, &solution);

        assert!(svg.starts_with("<?xml"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("Instance: test"));
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains(Visualizer::route_color(0)));
        assert!(svg.contains(Visualizer::route_color(1)));
        assert_eq!(svg.matches("<circle").count(), 3);
        assert_eq!(svg.matches("class=\"depot\"").count(), 1);
    }

    #[test]
    fn test_export_plot_data() {
        let instance = create_test_instance();
        let solution = create_test_solution(&instance);

        let data = Visualizer::new().export_plot_data(&instance, &solution);

        assert!(data.contains("# Cost: 54"));
        assert!(data.contains("1,10,0,4\n"));
        assert!(data.contains("8;0,1,2\n"));
        assert!(data.contains("4;0,3\n"));
    }

    #[test]
    fn test_route_colors_cycle() {
        assert_eq!(Visualizer::route_color(0), Visualizer::route_color(ROUTE_COLORS.len()));
        assert_ne!(Visualizer::route_color(0), Visualizer::route_color(1));
    }
}
