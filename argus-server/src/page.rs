// Embedded demo page - no template engine, no static file directory

/// Single-page UI for the live stream and single-image detection.
pub const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Argus - Live Detection</title>
<style>
  body { font-family: -apple-system, "Segoe UI", sans-serif; margin: 2rem; background: #111; color: #eee; }
  h1 { font-size: 1.4rem; }
  fieldset { border: 1px solid #444; border-radius: 6px; margin-bottom: 1.5rem; padding: 1rem; }
  legend { padding: 0 .5rem; color: #9cf; }
  label { display: inline-block; margin-right: 1rem; }
  input[type=text], input[type=number] { width: 6rem; background: #222; color: #eee; border: 1px solid #555; padding: .2rem; }
  input[name=classes] { width: 14rem; }
  button { background: #2a6; color: #fff; border: none; border-radius: 4px; padding: .4rem 1rem; margin-right: .5rem; cursor: pointer; }
  button.stop { background: #a33; }
  img#stream { max-width: 640px; border: 1px solid #444; display: block; margin-top: 1rem; }
  pre { background: #1a1a1a; padding: .5rem; border-radius: 4px; }
  a { color: #9cf; }
</style>
</head>
<body>
<h1>Argus - Object Detection</h1>

<fieldset>
  <legend>Live camera</legend>
  <label>Camera <input type="number" id="cam" value="0" min="0"></label>
  <label>Confidence <input type="number" id="conf" value="0.25" step="0.05" min="0" max="1"></label>
  <label>Input size <input type="number" id="imgsz" value="640" step="32"></label>
  <label>Classes <input type="text" id="classes" name="classes" placeholder="person, car, dog"></label>
  <div style="margin-top:.8rem">
    <button onclick="startLive()">Start</button>
    <button class="stop" onclick="stopLive()">Stop</button>
  </div>
  <img id="stream" alt="live stream appears here">
  <pre id="stats">fps: - total: -</pre>
</fieldset>

<fieldset>
  <legend>Single image</legend>
  <form id="single" enctype="multipart/form-data">
    <label>Image <input type="file" name="file" accept="image/*"></label>
    <label>Confidence <input type="number" name="conf" value="0.25" step="0.05" min="0" max="1"></label>
    <label>Classes <input type="text" name="classes" placeholder="person, car"></label>
    <button type="submit">Detect</button>
  </form>
  <div id="result"></div>
</fieldset>

<script>
async function startLive() {
  const body = {
    cam: parseInt(document.getElementById('cam').value) || 0,
    conf: parseFloat(document.getElementById('conf').value) || 0.25,
    imgsz: parseInt(document.getElementById('imgsz').value) || 640,
    classes: document.getElementById('classes').value
  };
  await fetch('/live/start', {
    method: 'POST',
    headers: {'Content-Type': 'application/json'},
    body: JSON.stringify(body)
  });
  document.getElementById('stream').src = '/live/stream?' + Date.now();
}

async function stopLive() {
  await fetch('/live/stop', {method: 'POST'});
  document.getElementById('stream').removeAttribute('src');
}

setInterval(async () => {
  try {
    const s = await (await fetch('/live/stats')).json();
    document.getElementById('stats').textContent =
      'fps: ' + s.fps.toFixed(1) + ' total: ' + s.total + ' ' + JSON.stringify(s.per_class);
  } catch (e) { /* server away */ }
}, 1000);

document.getElementById('single').addEventListener('submit', async (ev) => {
  ev.preventDefault();
  const resp = await fetch('/single/detect', {method: 'POST', body: new FormData(ev.target)});
  const out = document.getElementById('result');
  if (!resp.ok) {
    out.textContent = 'detection failed (' + resp.status + ')';
    return;
  }
  const r = await resp.json();
  out.innerHTML = 'total: ' + r.total + ' ' + JSON.stringify(r.per_class) +
    '<br><a href="' + r.out_url + '" target="_blank"><img src="' + r.out_url + '" style="max-width:640px"></a>';
});
</script>
</body>
</html>
"#;
