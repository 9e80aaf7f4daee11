//! HTML bodies for results emails.

use autotune_core::recommendations::{ParameterRecommendation, Recommendations};

const STYLE: &str = "table{border-collapse:collapse}\
                     th,td{border:1px solid #ccc;padding:4px 8px;text-align:right}\
                     th:first-child,td:first-child{text-align:left}";

/// Body sent when the tuning run produced parseable recommendations.
pub fn render_success(recommendations: &Recommendations) -> String {
    let units = escape_html(&recommendations.units);
    let mut html = format!(
        "<html><head><style>{STYLE}</style></head><body>\
         <h1>Autotune Results</h1>\
         <p>Autotune has finished analysing your data. The recommended \
         changes to your profile are shown below. Please review them \
         carefully before making any changes to your pump settings.</p>"
    );

    html.push_str("<h2>Insulin Sensitivity and Carb Ratio</h2>");
    html.push_str("<table><tr><th>Parameter</th><th>Current</th><th>Autotune</th></tr>");
    parameter_row(
        &mut html,
        &format!("ISF [{units}/U]"),
        recommendations.sensitivity.as_ref(),
        1,
    );
    if let Some(csf) = &recommendations.carb_sensitivity {
        parameter_row(&mut html, &format!("CSF [{units}/g]"), Some(csf), 1);
    }
    parameter_row(
        &mut html,
        "Carb Ratio [g/U]",
        recommendations.carb_ratio.as_ref(),
        1,
    );
    html.push_str("</table>");

    html.push_str("<h2>Basal Rates [U/hr]</h2>");
    html.push_str(
        "<table><tr><th>Time</th><th>Current</th><th>Autotune</th>\
         <th>Rounded</th><th>Days Missing</th></tr>",
    );
    for basal in &recommendations.basals {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&basal.time),
            format_value(basal.current, 3),
            format_value(basal.suggested, 3),
            format_value(basal.suggested_rounded, 3),
            basal.days_missing.map(|d| d.to_string()).unwrap_or_default(),
        ));
    }
    html.push_str("</table>");

    html.push_str(
        "<p>The full log files produced by Autotune are attached.</p></body></html>",
    );
    html
}

/// Body sent when the run failed or its output could not be read.
pub fn render_failure() -> String {
    format!(
        "<html><head><style>{STYLE}</style></head><body>\
         <h1>Autotune Results</h1>\
         <p>Unfortunately Autotune was not able to produce any recommendations \
         from your data.</p>\
         <p>Any log files that were produced are attached to this email and \
         may help identify the problem. Common causes are a data source that \
         is not publicly readable, or too little treatment data in the \
         selected period.</p>\
         </body></html>"
    )
}

fn parameter_row(
    html: &mut String,
    label: &str,
    recommendation: Option<&ParameterRecommendation>,
    decimals: usize,
) {
    let (current, suggested) = recommendation
        .map(|r| (r.current, r.suggested))
        .unwrap_or((None, None));
    html.push_str(&format!(
        "<tr><td>{label}</td><td>{}</td><td>{}</td></tr>",
        format_value(current, decimals),
        format_value(suggested, decimals),
    ));
}

fn format_value(value: Option<f64>, decimals: usize) -> String {
    value
        .map(|v| format!("{v:.decimals$}"))
        .unwrap_or_default()
}

fn escape_html(text: &str) -> String {
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
