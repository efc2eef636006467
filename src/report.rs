//! Self-contained HTML report

use std::fmt::Write as _;
use std::path::Path;

use log::info;

use crate::error::Result;
use crate::io::DESeqResults;

const STYLE: &str = r#"
        body { font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; color: #333; }
        .container { max-width: 1100px; margin: 0 auto; }
        section { background: white; border-radius: 5px; box-shadow: 0 2px 5px rgba(0,0,0,0.1); padding: 15px; margin-bottom: 20px; }
        table { border-collapse: collapse; font-size: 13px; }
        th, td { padding: 4px 10px; border-bottom: 1px solid #ddd; text-align: right; }
        th:first-child, td:first-child { text-align: left; }
        pre { background: #fafafa; padding: 10px; }
        .figure svg { max-width: 100%; height: auto; }
"#;

/// Escape text for use in HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn format_value(x: f64) -> String {
    if x.is_nan() {
        "NA".to_string()
    } else if x != 0.0 && (x.abs() < 1e-3 || x.abs() >= 1e5) {
        format!("{:.3e}", x)
    } else {
        format!("{:.3}", x)
    }
}

/// One titled figure
#[derive(Debug, Clone)]
struct Figure {
    title: String,
    caption: String,
    svg: String,
}

/// HTML document assembled section by section
#[derive(Debug, Clone)]
pub struct Report {
    title: String,
    inputs: Vec<(String, String)>,
    summary: Option<String>,
    top_genes: Option<String>,
    figures: Vec<Figure>,
}

impl Report {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            inputs: Vec::new(),
            summary: None,
            top_genes: None,
            figures: Vec::new(),
        }
    }

    /// Add a line to the input description
    pub fn add_input(&mut self, name: &str, value: &str) -> &mut Self {
        self.inputs.push((name.to_string(), value.to_string()));
        self
    }

    /// Contrast and summary counts of `results`
    pub fn set_summary(&mut self, results: &DESeqResults, alpha: f64) -> &mut Self {
        let mut html = String::new();
        let _ = writeln!(html, "<p>Contrast: {}</p>", escape_html(&results.contrast.to_string()));
        let _ = writeln!(html, "<pre>{}</pre>", escape_html(&results.summary(alpha).to_string()));
        self.summary = Some(html);
        self
    }

    /// Table of the first `n` rows of `results`, which should already be
    /// ordered by adjusted p-value
    pub fn set_top_genes(&mut self, results: &DESeqResults, n: usize) -> &mut Self {
        let mut html = String::from(
            "<table>\n<tr><th>gene</th><th>baseMean</th><th>log2FoldChange</th>\
             <th>lfcSE</th><th>stat</th><th>pvalue</th><th>padj</th></tr>\n",
        );
        for i in 0..n.min(results.n_genes()) {
            let _ = write!(html, "<tr><td>{}</td>", escape_html(&results.gene_ids[i]));
            for value in [
                results.base_means[i],
                results.log2_fold_changes[i],
                results.lfc_se[i],
                results.stat[i],
                results.pvalues[i],
                results.padj[i],
            ] {
                let _ = write!(html, "<td>{}</td>", format_value(value));
            }
            html.push_str("</tr>\n");
        }
        html.push_str("</table>\n");
        self.top_genes = Some(html);
        self
    }

    /// Append a figure; `svg` is inlined as is
    pub fn add_figure(&mut self, title: &str, caption: &str, svg: String) -> &mut Self {
        self.figures.push(Figure {
            title: title.to_string(),
            caption: caption.to_string(),
            svg,
        });
        self
    }

    pub fn n_figures(&self) -> usize {
        self.figures.len()
    }

    pub fn to_html(&self) -> String {
        let title = escape_html(&self.title);
        let mut html = String::new();
        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n\
             <style>{STYLE}</style>\n</head>\n<body>\n<div class=\"container\">\n<h1>{title}</h1>\n"
        );

        if !self.inputs.is_empty() {
            html.push_str("<section id=\"inputs\">\n<h2>Inputs</h2>\n<ul>\n");
            for (name, value) in &self.inputs {
                let _ = writeln!(html, "<li>{}: {}</li>", escape_html(name), escape_html(value));
            }
            html.push_str("</ul>\n</section>\n");
        }
        if let Some(summary) = &self.summary {
            let _ = write!(html, "<section id=\"summary\">\n<h2>Summary</h2>\n{}</section>\n", summary);
        }
        if let Some(table) = &self.top_genes {
            let _ = write!(html, "<section id=\"top-genes\">\n<h2>Top genes</h2>\n{}</section>\n", table);
        }
        for (k, figure) in self.figures.iter().enumerate() {
            let _ = write!(
                html,
                "<section class=\"figure\" id=\"figure-{}\">\n<h2>{}</h2>\n<p>{}</p>\n{}\n</section>\n",
                k + 1,
                escape_html(&figure.title),
                escape_html(&figure.caption),
                figure.svg
            );
        }
        html.push_str("</div>\n</body>\n</html>\n");
        html
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_html())?;
        info!("Wrote report with {} figures to {}", self.figures.len(), path.display());
        Ok(())
    }
}
