use crate::report::ReportData;

/// Render a self-contained HTML report (data embedded as JSON).
///
/// Important: we avoid `format!()` because the HTML contains many `{}` from JS
/// template literals (e.g., `${x}`), which would conflict with Rust formatting.
pub fn render_html_report(data: &ReportData) -> anyhow::Result<String> {
    let json = serde_json::to_string(data)?; // embedded as JS object literal

    const TEMPLATE: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Workspace Explorer</title>
<style>
  body { font-family: system-ui, -apple-system, Segoe UI, Roboto, Arial, sans-serif; margin: 0; }
  header { padding: 12px 16px; border-bottom: 1px solid #ddd; }
  .container { display: flex; height: calc(100vh - 58px); }
  .sidebar { width: 320px; border-right: 1px solid #ddd; padding: 12px; overflow: auto; }
  .main { flex: 1; padding: 12px; overflow: auto; }

  .summary { display: flex; gap: 16px; flex-wrap: wrap; font-size: 14px; color: #333; }
  .pill { padding: 4px 8px; border: 1px solid #ddd; border-radius: 999px; background: #fafafa; }

  .member-row { cursor: pointer; user-select: none; padding: 2px 4px; border-radius: 4px; }
  .member-row:hover { background: #f3f3f3; }
  .member-row.selected { background: #e9f2ff; border: 1px solid #cfe3ff; }
  .muted { color: #777; font-size: 12px; }
  .warn { color: #a15c00; font-size: 13px; margin-top: 6px; }

  .link { color: #0b5bd3; cursor: pointer; }
  .link:hover { text-decoration: underline; }

  table { border-collapse: collapse; width: 100%; margin-top: 8px; }
  th, td { border-bottom: 1px solid #eee; padding: 6px 8px; text-align: left; font-size: 14px; }
  th { background: white; border-bottom: 1px solid #ddd; }
  code { font-family: ui-monospace, SFMono-Regular, Menlo, Consolas, monospace; font-size: 13px; }

  svg { border: 1px solid #eee; border-radius: 6px; margin-top: 12px; background: #fcfcfc; }
  .node rect { fill: #e9f2ff; stroke: #cfe3ff; rx: 4; }
  .node.selected rect { fill: #ffe9c7; stroke: #f3c97e; }
  .node text { font-size: 12px; }
  .edge { stroke: #bbb; fill: none; }
</style>
</head>
<body>
<header>
  <div class="summary" id="summary"></div>
</header>

<div class="container">
  <div class="sidebar">
    <input id="search" placeholder="Search name or class..."
           style="width: 100%; box-sizing: border-box; padding: 6px 8px; border: 1px solid #ddd; border-radius: 6px; margin-bottom: 8px;">
    <div id="memberList"></div>
  </div>

  <div class="main">
    <h2 id="title">Select a member</h2>
    <div id="meta" class="muted"></div>
    <div id="detail"></div>
    <div id="graph"></div>
  </div>
</div>

<script>
// Embedded report data (JSON object literal)
const DATA = __DATA__;

const state = {
  selected: null,
  search: ""
};

function escapeHtml(s) {
  return String(s)
    .replaceAll("&", "&amp;")
    .replaceAll("<", "&lt;")
    .replaceAll(">", "&gt;")
    .replaceAll('"', "&quot;")
    .replaceAll("'", "&#39;");
}

function renderSummary() {
  const el = document.getElementById("summary");
  let pills = `<span class="pill">workspace: <b>${escapeHtml(DATA.workspace)}</b></span>` +
    `<span class="pill">source: <b>${escapeHtml(DATA.source)}</b></span>`;
  if (DATA.root) {
    pills += `<span class="pill">graph root: <b>${escapeHtml(DATA.root)}</b></span>`;
  }
  for (const [kind, count] of Object.entries(DATA.totals)) {
    pills += `<span class="pill">${escapeHtml(kind)}: <b>${count}</b></span>`;
  }
  el.innerHTML = pills;
}

function memberMatches(view) {
  if (!state.search) return true;
  const s = state.search.toLowerCase();
  return view.name.toLowerCase().includes(s) || view.class_name.toLowerCase().includes(s);
}

function renderMemberList() {
  const root = document.getElementById("memberList");
  root.innerHTML = "";
  for (const view of Object.values(DATA.members)) {
    if (!memberMatches(view)) continue;
    const row = document.createElement("div");
    row.className = "member-row" + (state.selected === view.name ? " selected" : "");
    row.onclick = () => selectMember(view.name);
    row.innerHTML = `${escapeHtml(view.name)} <span class="muted">${escapeHtml(view.kind)}</span>`;
    root.appendChild(row);
  }
}

function nameLinks(names) {
  if (!names.length) return '<span class="muted">none</span>';
  return names.map((n) =>
    DATA.members[n]
      ? `<span class="link" onclick="selectMember('${escapeHtml(n)}')">${escapeHtml(n)}</span>`
      : escapeHtml(n)
  ).join(", ");
}

function selectMember(name) {
  state.selected = name;
  const view = DATA.members[name];
  document.getElementById("title").textContent = view.name;
  document.getElementById("meta").textContent =
    `${view.class_name} | ${view.kind} | uses ${view.overall_num_servers} member(s) overall | used by ${view.overall_num_clients} member(s) overall`;

  const rows = [];
  if (view.value !== undefined && view.value !== null) {
    rows.push(["value", String(view.value)]);
  }
  if (view.is_constant !== undefined && view.is_constant !== null) {
    rows.push(["constant", view.is_constant ? "yes" : "no"]);
  }
  if (view.formula) {
    rows.push(["formula", `<code>${escapeHtml(view.formula)}</code>`]);
    rows.push(["expanded", `<code>${escapeHtml(view.formula_expanded)}</code>`]);
  }
  rows.push(["uses", nameLinks(view.servers)]);
  rows.push(["used by", nameLinks(view.clients)]);

  let html = "<table><tbody>";
  for (const [label, value] of rows) {
    html += `<tr><th style="width: 120px;">${label}</th><td>${value}</td></tr>`;
  }
  html += "</tbody></table>";
  if (!view.has_relationship_data) {
    html += '<div class="warn">This member reported no relationship data; its dependency lists may be incomplete.</div>';
  }
  document.getElementById("detail").innerHTML = html;

  renderMemberList();
  renderGraph();
}

// Layered layout: one column per minimal depth, edges drawn server -> client.
function renderGraph() {
  const el = document.getElementById("graph");
  const nodes = DATA.graph.nodes;
  if (!nodes.length) { el.innerHTML = ""; return; }

  const layers = new Map();
  for (let i = 0; i < nodes.length; i++) {
    const d = nodes[i].depth;
    if (!layers.has(d)) layers.set(d, []);
    layers.get(d).push(i);
  }

  const colW = 180, rowH = 34, boxW = 150, boxH = 24;
  const depths = [...layers.keys()].sort((a, b) => a - b);
  const maxRows = Math.max(...[...layers.values()].map((l) => l.length));
  const width = depths.length * colW + 20;
  const height = maxRows * rowH + 20;

  const pos = new Map();
  for (const d of depths) {
    const column = layers.get(d);
    for (let row = 0; row < column.length; row++) {
      pos.set(column[row], {
        x: 10 + depths.indexOf(d) * colW,
        y: 10 + row * rowH
      });
    }
  }

  let svg = `<svg width="${width}" height="${height}">`;
  for (const [from, to] of DATA.graph.edges) {
    const a = pos.get(from), b = pos.get(to);
    svg += `<line class="edge" x1="${a.x + boxW}" y1="${a.y + boxH / 2}" x2="${b.x}" y2="${b.y + boxH / 2}"/>`;
  }
  for (const [i, p] of pos.entries()) {
    const node = nodes[i];
    const selected = state.selected === node.name ? " selected" : "";
    svg += `<g class="node${selected}" onclick="selectMember('${escapeHtml(node.name)}')" style="cursor: pointer;">` +
      `<rect x="${p.x}" y="${p.y}" width="${boxW}" height="${boxH}" rx="4"/>` +
      `<text x="${p.x + 6}" y="${p.y + 16}">${escapeHtml(node.name)}</text>` +
      `</g>`;
  }
  svg += "</svg>";
  el.innerHTML = svg;
}

document.getElementById("search").addEventListener("input", (e) => {
  state.search = e.target.value || "";
  renderMemberList();
});

renderSummary();
renderMemberList();
renderGraph();
const first = DATA.root || Object.keys(DATA.members)[0];
if (first && DATA.members[first]) selectMember(first);
</script>
</body>
</html>
"#;

    Ok(TEMPLATE.replace("__DATA__", &json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::fixtures::dump_text;
    use crate::member::{KindHint, Member};
    use crate::report::build_report_data;
    use crate::workspace::{ResolutionMode, Workspace};

    #[test]
    fn report_embeds_the_data_and_member_names() {
        let mut ws = Workspace::new("transcript", "wspace", ResolutionMode::ByName);
        let raw = dump_text("0x1", &[], &[]);
        let member = Member::from_dump("mhyp", "RooRealVar", KindHint::Variable, &raw).unwrap();
        ws.register(member).unwrap();
        ws.finalize().unwrap();

        let data = build_report_data(&ws, None).unwrap();
        let html = render_html_report(&data).unwrap();

        assert!(!html.contains("__DATA__"));
        assert!(html.contains("\"mhyp\""));
        assert!(html.contains("Workspace Explorer"));
    }
}
