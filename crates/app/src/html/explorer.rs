pub const EXPLORER_HTML: &str = r#"
<!doctype html>
<html lang="en">

<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>geosql explorer</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css" crossorigin="" />
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js" crossorigin=""></script>
  <style>
    html, body { height: 100%; margin: 0; font-family: ui-sans-serif, system-ui, sans-serif; }
    body { display: grid; grid-template-rows: auto 1fr 30%; }
    header { display: flex; gap: 8px; padding: 8px; background: #0f172a; color: #e2e8f0; align-items: flex-start; }
    header textarea { flex: 1; min-height: 64px; font-family: ui-monospace, monospace; font-size: 13px; }
    header button { padding: 6px 16px; }
    #status { min-width: 180px; font-size: 13px; }
    #status.failed, #error { color: #fb7185; }
    #map { width: 100%; height: 100%; }
    #results { overflow: auto; border-top: 1px solid #cbd5e1; }
    #error { padding: 4px 8px; font-family: ui-monospace, monospace; white-space: pre-wrap; }
    table { border-collapse: collapse; font-size: 12px; }
    th, td { border: 1px solid #e2e8f0; padding: 2px 6px; text-align: left; white-space: nowrap; }
    th { position: sticky; top: 0; background: #f1f5f9; }
  </style>
</head>

<body>
  <header>
    <textarea id="sql" spellcheck="false">SELECT ST_AsGeoJSON(geom) AS geojson, * EXCLUDE (geom)
FROM ST_Read('data.geojson')
LIMIT 1000</textarea>
    <button id="run" disabled>Run</button>
    <div id="status">engine: uninitialized</div>
  </header>
  <div id="map"></div>
  <section id="results">
    <div id="error"></div>
    <table id="table"></table>
  </section>

  <script>
    const map = L.map('map');
    let overlay = null;
    let overlayStyle = null;

    const rgb = (c) => `rgb(${c[0]}, ${c[1]}, ${c[2]})`;

    function drawOverlay(layer) {
      if (overlay) overlay.remove();
      overlayStyle = layer;
      overlay = L.geoJSON(layer.data, {
        style: () => ({
          stroke: layer.stroked,
          color: rgb(layer.line_color),
          weight: layer.line_width_min_pixels,
          fill: layer.filled,
          fillColor: rgb(layer.fill_color),
        }),
        pointToLayer: (_feature, latlng) => L.circleMarker(latlng, {
          radius: Math.max(layer.point_radius_min_pixels, layer.point_radius / 2),
          stroke: layer.stroked,
          color: rgb(layer.line_color),
          fillColor: rgb(layer.fill_color),
          fillOpacity: 0.8,
        }),
        onEachFeature: (feature, leafletLayer) => {
          if (!layer.pickable) return;
          leafletLayer.bindPopup(() => popupContent(feature.properties || {}));
        },
      }).addTo(map);
    }

    // Property names and values come from query results; only ever set as text.
    function popupContent(properties) {
      const box = document.createElement('div');
      const entries = Object.entries(properties);
      if (entries.length === 0) box.textContent = '(no properties)';
      for (const [k, v] of entries) {
        const line = box.appendChild(document.createElement('div'));
        line.appendChild(document.createElement('b')).textContent = k;
        const text = v !== null && typeof v === 'object' ? JSON.stringify(v) : String(v);
        line.appendChild(document.createTextNode(`: ${text}`));
      }
      return box;
    }

    function drawLayers(layers) {
      for (const layer of layers) {
        if (layer.kind === 'geo_json') drawOverlay(layer);
      }
    }

    function drawTable(table) {
      const el = document.getElementById('table');
      el.replaceChildren();
      if (!table) return;
      const head = el.createTHead().insertRow();
      for (const h of table.headers) head.appendChild(document.createElement('th')).textContent = h;
      const body = el.createTBody();
      for (const row of table.rows) {
        const tr = body.insertRow();
        for (const cell of row) tr.insertCell().textContent = cell;
      }
    }

    function drawSession(session) {
      document.getElementById('error').textContent = session.last_error || '';
      if (session.snapshot) {
        drawTable(session.snapshot.table);
        drawLayers(session.snapshot.layers);
      }
    }

    async function boot() {
      const { view, layers } = await (await fetch('/api/map')).json();
      map.setView([view.latitude, view.longitude], view.zoom);
      for (const layer of layers) {
        if (layer.kind === 'tile') {
          L.tileLayer(layer.url_template, {
            minZoom: layer.min_zoom,
            maxZoom: layer.max_zoom,
            tileSize: layer.tile_size,
            attribution: 'base tiles',
          }).addTo(map);
        }
      }
      drawLayers(layers);
      drawSession(await (await fetch('/api/session')).json());
    }

    const status = new EventSource('/api/status/stream');
    status.onmessage = (event) => {
      const state = JSON.parse(event.data);
      const el = document.getElementById('status');
      el.className = state.state;
      el.textContent = state.error ? `engine failed: ${state.error}` : `engine: ${state.state}`;
      document.getElementById('run').disabled = state.state !== 'ready';
    };

    document.getElementById('run').addEventListener('click', async () => {
      const button = document.getElementById('run');
      button.disabled = true;
      try {
        const response = await fetch('/api/query', {
          method: 'POST',
          headers: { 'Content-Type': 'application/json' },
          body: JSON.stringify({ sql: document.getElementById('sql').value }),
        });
        drawSession(await response.json());
      } catch (err) {
        document.getElementById('error').textContent = String(err);
      } finally {
        button.disabled = false;
      }
    });

    boot();
  </script>
</body>

</html>
"#;
