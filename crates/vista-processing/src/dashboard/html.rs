//! HTML rendering of a [`DashboardSpec`].
//!
//! Static parts (KPI cards, insights, notes) are plain HTML so they read
//! without JavaScript. Charts and tables are drawn from an embedded JSON
//! payload, optionally gzip-compressed and base64-encoded. Plotly is loaded
//! from a CDN; offline, each chart shows a notice and the tables still work.

use super::{DashboardSpec, FilterSpec, TableSpec};
use crate::config::Theme;
use crate::error::{PipelineError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Serialize;
use serde_json::Value;
use std::io::{Read, Write};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

#[derive(Serialize)]
struct Payload<'a> {
    charts: Vec<ChartPayload<'a>>,
    tables: &'a [TableSpec],
    filters: &'a [FilterSpec],
}

#[derive(Serialize)]
struct ChartPayload<'a> {
    id: &'a str,
    figure: &'a Value,
}

/// Gzip then base64 a JSON payload.
pub fn encode_payload(json: &str) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json.as_bytes())?;
    Ok(STANDARD.encode(encoder.finish()?))
}

/// Inverse of [`encode_payload`].
pub fn decode_payload(encoded: &str) -> Result<String> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| PipelineError::Internal(format!("invalid payload encoding: {e}")))?;
    let mut json = String::new();
    GzDecoder::new(bytes.as_slice()).read_to_string(&mut json)?;
    Ok(json)
}

pub(crate) fn escape_html(text: &str) -> String {
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

/// Inline `code` spans from insight statements.
fn inline_markup(text: &str) -> String {
    escape_html(text)
        .split('`')
        .enumerate()
        .map(|(i, part)| if i % 2 == 1 { format!("<code>{part}</code>") } else { part.to_string() })
        .collect()
}

pub(crate) fn render(spec: &DashboardSpec, compress: bool) -> Result<String> {
    let payload = Payload {
        charts: spec
            .charts
            .iter()
            .map(|c| ChartPayload {
                id: &c.id,
                figure: &c.figure,
            })
            .collect(),
        tables: &spec.tables,
        filters: &spec.filters,
    };
    let json = serde_json::to_string(&payload)?;

    let mut html = String::new();
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!("<title>{} | Vista dashboard</title>\n", escape_html(&spec.title)));
    html.push_str(&generate_css(spec.theme));
    html.push_str(&format!("<script src=\"{PLOTLY_CDN}\" defer></script>\n"));
    html.push_str("</head>\n<body>\n");

    html.push_str(&format!(
        "<header><h1>{}</h1><p class=\"muted\">Analytics dashboard</p></header>\n",
        escape_html(&spec.title)
    ));
    html.push_str(&kpi_section(spec));
    html.push_str(&insight_section(spec));
    html.push_str(&chart_section(spec));
    html.push_str(&table_section(spec));

    if compress {
        html.push_str(&format!(
            "<script id=\"vista-payload\" type=\"application/octet-stream\" data-encoding=\"gzip+base64\">{}</script>\n",
            encode_payload(&json)?
        ));
    } else {
        // '<' only occurs inside JSON strings, where the escape is valid
        html.push_str(&format!(
            "<script id=\"vista-payload\" type=\"application/json\">{}</script>\n",
            json.replace('<', "\\u003c")
        ));
    }
    html.push_str(SCRIPT);
    html.push_str("</body>\n</html>\n");
    Ok(html)
}

fn generate_css(theme: Theme) -> String {
    let (bg, fg, card, muted, border, accent) = match theme {
        Theme::Light => ("#f7f8fa", "#1f2430", "#ffffff", "#6b7280", "#e5e7eb", "#2563eb"),
        Theme::Dark => ("#14171f", "#e5e7eb", "#1f2430", "#9ca3af", "#2f3542", "#60a5fa"),
    };
    format!(
        r#"<style>
:root {{
  --bg: {bg};
  --fg: {fg};
  --card: {card};
  --muted: {muted};
  --border: {border};
  --accent: {accent};
}}
body {{ margin: 0; padding: 24px; background: var(--bg); color: var(--fg); font-family: system-ui, -apple-system, "Segoe UI", sans-serif; }}
header h1 {{ margin: 0 0 4px 0; }}
.muted {{ color: var(--muted); }}
section {{ margin-top: 28px; }}
.kpis {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(170px, 1fr)); gap: 12px; }}
.kpi, .chart, .note {{ background: var(--card); border: 1px solid var(--border); border-radius: 8px; padding: 14px; }}
.kpi .value {{ font-size: 1.8em; font-weight: 600; color: var(--accent); }}
.charts {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(420px, 1fr)); gap: 16px; }}
.chart-body {{ min-height: 320px; }}
.insight {{ border-left: 4px solid var(--border); padding: 6px 12px; margin-bottom: 8px; background: var(--card); }}
.insight.p1 {{ border-left-color: #dc2626; }}
.insight.p2 {{ border-left-color: #f59e0b; }}
.insight.p3 {{ border-left-color: var(--muted); }}
.insight .action {{ color: var(--muted); font-size: 0.9em; }}
table {{ border-collapse: collapse; width: 100%; background: var(--card); font-size: 0.9em; }}
th, td {{ border: 1px solid var(--border); padding: 4px 8px; text-align: left; }}
.table-wrap {{ max-height: 480px; overflow: auto; }}
.filters label {{ margin-right: 12px; }}
code {{ background: var(--bg); padding: 0 3px; border-radius: 3px; }}
</style>
"#
    )
}

fn kpi_section(spec: &DashboardSpec) -> String {
    let mut html = String::from("<section class=\"kpis\">\n");
    for card in &spec.kpi_cards {
        html.push_str(&format!(
            "<div class=\"kpi\" id=\"{}\"><div class=\"muted\">{}</div><div class=\"value\">{}</div>",
            escape_html(&card.id),
            escape_html(&card.label),
            escape_html(&card.value)
        ));
        if let Some(detail) = &card.detail {
            html.push_str(&format!("<div class=\"muted\">{}</div>", escape_html(detail)));
        }
        html.push_str("</div>\n");
    }
    html.push_str("</section>\n");
    html
}

fn insight_section(spec: &DashboardSpec) -> String {
    if spec.insights.is_empty() {
        return String::new();
    }
    let mut html = String::from("<section id=\"insights\">\n<h2>Insights</h2>\n");
    for insight in &spec.insights {
        html.push_str(&format!(
            "<div class=\"insight p{}\"><strong>{}</strong>: {}<div class=\"action\">{}</div></div>\n",
            insight.priority,
            escape_html(insight.category.title()),
            inline_markup(&insight.statement),
            escape_html(&insight.recommended_action)
        ));
    }
    html.push_str("</section>\n");
    html
}

fn chart_section(spec: &DashboardSpec) -> String {
    let mut html = String::from("<section>\n<h2>Charts</h2>\n<div class=\"charts\">\n");
    for chart in &spec.charts {
        html.push_str(&format!(
            "<div class=\"chart\" data-kind=\"{}\"><h3>{}</h3><div class=\"chart-body\" id=\"{}\"></div></div>\n",
            chart.kind.as_str(),
            escape_html(&chart.title),
            escape_html(&chart.id)
        ));
    }
    html.push_str("</div>\n");
    for skipped in &spec.skipped_charts {
        html.push_str(&format!(
            "<div class=\"note\">Chart \"{}\" was not rendered: {}</div>\n",
            escape_html(&skipped.title),
            escape_html(&skipped.reason)
        ));
    }
    html.push_str("</section>\n");
    html
}

fn table_section(spec: &DashboardSpec) -> String {
    let mut html = String::new();
    for table in &spec.tables {
        html.push_str(&format!("<section>\n<h2>{}</h2>\n", escape_html(&table.title)));
        let filters: Vec<&FilterSpec> = spec.filters.iter().filter(|f| f.table == table.id).collect();
        if !filters.is_empty() {
            html.push_str("<div class=\"filters\">");
            for filter in filters {
                html.push_str(&format!(
                    "<label>{} <select data-table=\"{}\" data-column=\"{}\"><option value=\"\">All</option>",
                    escape_html(&filter.column),
                    escape_html(&table.id),
                    escape_html(&filter.column)
                ));
                for option in &filter.options {
                    let option = escape_html(option);
                    html.push_str(&format!("<option value=\"{option}\">{option}</option>"));
                }
                html.push_str("</select></label>");
            }
            html.push_str("</div>\n");
        }
        html.push_str(&format!(
            "<div class=\"table-wrap\"><table id=\"{}\"></table></div>\n</section>\n",
            escape_html(&table.id)
        ));
    }
    html
}

const SCRIPT: &str = r#"<script>
(function () {
  async function loadPayload() {
    const el = document.getElementById('vista-payload');
    if (el.dataset.encoding === 'gzip+base64') {
      const bytes = Uint8Array.from(atob(el.textContent.trim()), c => c.charCodeAt(0));
      const stream = new Blob([bytes]).stream().pipeThrough(new DecompressionStream('gzip'));
      return JSON.parse(await new Response(stream).text());
    }
    return JSON.parse(el.textContent);
  }

  function themed(layout) {
    const css = getComputedStyle(document.documentElement);
    const out = Object.assign({}, layout);
    out.paper_bgcolor = css.getPropertyValue('--card').trim();
    out.plot_bgcolor = css.getPropertyValue('--card').trim();
    out.font = { color: css.getPropertyValue('--fg').trim() };
    out.margin = { t: 48, r: 16, b: 48, l: 56 };
    return out;
  }

  function drawCharts(charts) {
    for (const chart of charts) {
      const target = document.getElementById(chart.id);
      if (!target) continue;
      if (window.Plotly) {
        window.Plotly.newPlot(target, chart.figure.data, themed(chart.figure.layout), { responsive: true, displaylogo: false });
      } else {
        target.textContent = 'Chart library unavailable offline; the data is embedded in this file.';
        target.className += ' muted';
      }
    }
  }

  function drawTable(table, filters) {
    const el = document.getElementById(table.id);
    if (!el) return;
    const active = filters
      .map(f => [table.columns.indexOf(f.column), f.value])
      .filter(([i, v]) => i >= 0 && v !== '');
    const head = '<thead><tr>' + table.columns.map(c => '<th>' + escape(c) + '</th>').join('') + '</tr></thead>';
    const rows = table.rows
      .filter(row => active.every(([i, v]) => row[i] === v))
      .map(row => '<tr>' + row.map(v => '<td>' + escape(v) + '</td>').join('') + '</tr>')
      .join('');
    el.innerHTML = head + '<tbody>' + rows + '</tbody>';
  }

  function escape(text) {
    return String(text).replace(/[&<>"']/g, c => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;', "'": '&#39;' })[c]);
  }

  function currentFilters(tableId) {
    return Array.from(document.querySelectorAll('select[data-table="' + tableId + '"]'))
      .map(s => ({ column: s.dataset.column, value: s.value }));
  }

  loadPayload().then(payload => {
    for (const table of payload.tables) {
      drawTable(table, currentFilters(table.id));
      document.querySelectorAll('select[data-table="' + table.id + '"]').forEach(select => {
        select.addEventListener('change', () => drawTable(table, currentFilters(table.id)));
      });
    }
    const start = () => drawCharts(payload.charts);
    if (document.readyState === 'complete') start(); else window.addEventListener('load', start);
  });
})();
</script>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{ChartKind, ChartSpec, DataBinding, KpiCard};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn spec(theme: Theme) -> DashboardSpec {
        DashboardSpec {
            title: "sales <2024>.csv".to_string(),
            theme,
            kpi_cards: vec![KpiCard {
                id: "kpi-rows".to_string(),
                label: "Rows".to_string(),
                value: "60".to_string(),
                detail: None,
            }],
            charts: vec![ChartSpec {
                id: "chart-01-bar".to_string(),
                kind: ChartKind::Bar,
                title: "Rows by region".to_string(),
                binding: DataBinding {
                    source: "sample".to_string(),
                    columns: vec!["region".to_string()],
                },
                figure: json!({ "data": [{ "type": "bar", "x": ["</script>"], "y": [1] }], "layout": {} }),
            }],
            tables: Vec::new(),
            filters: Vec::new(),
            insights: Vec::new(),
            skipped_charts: Vec::new(),
        }
    }

    #[test]
    fn test_payload_cannot_close_script() {
        let html = render(&spec(Theme::Light), false).unwrap();
        assert_eq!(html.matches("</script>").count(), 3);
        assert!(html.contains("sales &lt;2024&gt;.csv"));
        assert!(html.contains("id=\"chart-01-bar\""));
    }

    #[test]
    fn test_compressed_payload_round_trips() {
        let html = render(&spec(Theme::Light), true).unwrap();
        let start = html.find("data-encoding=\"gzip+base64\">").unwrap() + "data-encoding=\"gzip+base64\">".len();
        let end = start + html[start..].find("</script>").unwrap();
        let json: Value = serde_json::from_str(&decode_payload(&html[start..end]).unwrap()).unwrap();
        assert_eq!(json["charts"][0]["id"], "chart-01-bar");
    }

    #[test]
    fn test_theme_changes_only_styles() {
        let light = render(&spec(Theme::Light), false).unwrap();
        let dark = render(&spec(Theme::Dark), false).unwrap();
        assert_ne!(light, dark);
        let payload = |html: &str| html[html.find("vista-payload").unwrap()..].to_string();
        assert_eq!(payload(&light), payload(&dark));
    }

    #[test]
    fn test_inline_code_markup() {
        assert_eq!(inline_markup("`a` & `b`"), "<code>a</code> &amp; <code>b</code>");
    }
}
