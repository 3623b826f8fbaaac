//! Playwright session bridge
//!
//! Each session is a long-lived `node` process running a generated driver
//! script. The script owns one browser, one fresh context and one page, and
//! answers line-delimited JSON requests on stdin with one JSON line per
//! request on stdout. Keeping the process alive for the whole case is what
//! lets the input value and the rendered output survive between driver calls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::BrowserConfig;
use crate::error::{E2eError, E2eResult};
use crate::page::{BrowserPage, Navigation, NodeHandle, NodeSnapshot, SessionFactory};

const EXIT_GRACE: Duration = Duration::from_secs(2);

const BRIDGE_SCRIPT: &str = r#"
const { chromium, firefox, webkit } = require('playwright');
const readline = require('readline');

const engines = { chromium, firefox, webkit };
const ID_ATTR = 'data-swiftcheck-id';
let seq = 0;

function emit(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

async function stamp(el) {
  seq += 1;
  return el.evaluate((node, args) => {
    if (!node.getAttribute(args.attr)) node.setAttribute(args.attr, args.id);
    return node.getAttribute(args.attr);
  }, { attr: ID_ATTR, id: 'sc-' + seq });
}

function byHandle(page, handle) {
  return page.locator('[' + ID_ATTR + '="' + handle + '"]');
}

async function main() {
  const engine = engines[process.env.SWIFTCHECK_BROWSER || 'chromium'];
  const browser = await engine.launch({ headless: process.env.SWIFTCHECK_HEADLESS !== '0' });
  const context = await browser.newContext({
    viewport: {
      width: Number(process.env.SWIFTCHECK_VIEWPORT_WIDTH || 1280),
      height: Number(process.env.SWIFTCHECK_VIEWPORT_HEIGHT || 720),
    },
  });
  const page = await context.newPage();

  const ops = {
    async goto(req) {
      const response = await page.goto(req.url, { timeout: req.timeout_ms, waitUntil: 'load' });
      return { status: response ? response.status() : null };
    },
    async networkIdle(req) {
      await page.waitForLoadState('networkidle', { timeout: req.timeout_ms });
      return null;
    },
    async findTextbox(req) {
      const matches = page.getByRole('textbox', { name: req.name });
      if ((await matches.count()) === 0) return null;
      const el = await matches.first().elementHandle();
      const handle = await stamp(el);
      await el.dispose();
      return handle;
    },
    async clear(req) {
      await byHandle(page, req.handle).clear();
      return null;
    },
    async fill(req) {
      await byHandle(page, req.handle).fill(req.text);
      return null;
    },
    async pressSequentially(req) {
      await byHandle(page, req.handle).pressSequentially(req.text, { delay: req.delay_ms });
      return null;
    },
    async queryNodes(req) {
      const nodes = [];
      for (const el of await page.$$(req.selector)) {
        const handle = await stamp(el);
        const info = await el.evaluate((node) => ({
          tag: node.tagName,
          role: node.getAttribute('role'),
          text: node.textContent || '',
        }));
        nodes.push(Object.assign({ handle }, info));
        await el.dispose();
      }
      return nodes;
    },
  };

  emit({ ready: true });

  const lines = readline.createInterface({ input: process.stdin });
  for await (const line of lines) {
    if (!line.trim()) continue;

    let req;
    try {
      req = JSON.parse(line);
    } catch (e) {
      emit({ id: null, ok: false, error: { kind: 'protocol', message: e.message } });
      continue;
    }

    if (req.op === 'close') {
      emit({ id: req.id, ok: true, result: null });
      break;
    }

    const op = ops[req.op];
    if (!op) {
      emit({ id: req.id, ok: false, error: { kind: 'protocol', message: 'unknown op ' + req.op } });
      continue;
    }

    try {
      emit({ id: req.id, ok: true, result: await op(req) });
    } catch (e) {
      const kind = e && e.name === 'TimeoutError' ? 'timeout' : 'error';
      emit({ id: req.id, ok: false, error: { kind, message: String(e && e.message || e) } });
    }
  }

  await context.close();
  await browser.close();
}

main().catch((e) => {
  process.stderr.write(String((e && e.stack) || e) + '\n');
  process.exit(1);
});
"#;

/// One request to the driver script
#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Request<'a> {
    Goto { url: &'a str, timeout_ms: u64 },
    NetworkIdle { timeout_ms: u64 },
    FindTextbox { name: &'a str },
    Clear { handle: &'a str },
    Fill { handle: &'a str, text: &'a str },
    PressSequentially { handle: &'a str, text: &'a str, delay_ms: u64 },
    QueryNodes { selector: &'a str },
    Close,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    request: Request<'a>,
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<Fault>,
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct Fault {
    kind: String,
    message: String,
}

impl Response {
    fn into_result(self) -> E2eResult<serde_json::Value> {
        if self.ok {
            return Ok(self.result);
        }
        let fault = self.error.unwrap_or(Fault {
            kind: "error".to_string(),
            message: "bridge reported failure without details".to_string(),
        });
        Err(E2eError::Bridge(format!("{}: {}", fault.kind, fault.message)))
    }
}

#[derive(Debug, Deserialize)]
struct GotoResult {
    status: Option<u16>,
}

/// Check if Playwright is installed
pub fn check_playwright_installed() -> E2eResult<()> {
    let output = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        _ => Err(E2eError::PlaywrightNotFound),
    }
}

/// Session factory that launches one Playwright bridge per session
#[derive(Debug, Clone)]
pub struct PlaywrightTarget {
    config: BrowserConfig,
}

impl PlaywrightTarget {
    /// Fails with [`E2eError::PlaywrightNotFound`] when Playwright is missing
    pub fn new(config: BrowserConfig) -> E2eResult<Self> {
        check_playwright_installed()?;
        Ok(Self { config })
    }
}

#[async_trait]
impl SessionFactory for PlaywrightTarget {
    type Page = PlaywrightSession;

    async fn open_session(&self) -> E2eResult<PlaywrightSession> {
        PlaywrightSession::launch(&self.config).await
    }
}

/// A running bridge process bound to one page
pub struct PlaywrightSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    request_timeout: Duration,
    closed: bool,
    _script_dir: tempfile::TempDir,
}

impl PlaywrightSession {
    /// Write the driver script, start `node`, and wait for the ready line
    pub async fn launch(config: &BrowserConfig) -> E2eResult<Self> {
        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("swiftcheck-bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        debug!("Launching Playwright bridge: {}", script_path.display());

        let mut cmd = TokioCommand::new("node");
        cmd.arg(&script_path)
            .env("SWIFTCHECK_BROWSER", config.browser.as_str())
            .env("SWIFTCHECK_HEADLESS", if config.headless { "1" } else { "0" })
            .env("SWIFTCHECK_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("SWIFTCHECK_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(node_path) = &config.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| E2eError::Bridge(format!("failed to spawn node: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::Bridge("bridge stdout unavailable".into()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "swiftcheck::bridge", "{}", line);
                }
            });
        }

        let mut session = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            request_timeout: config.bridge_timeout(),
            closed: false,
            _script_dir: script_dir,
        };

        let ready = timeout(session.request_timeout, session.read_ready()).await;
        match ready {
            Ok(Ok(())) => Ok(session),
            Ok(Err(e)) => {
                session.shutdown().await;
                Err(e)
            }
            Err(_) => {
                session.shutdown().await;
                Err(E2eError::Bridge("browser did not start in time".into()))
            }
        }
    }

    async fn read_ready(&mut self) -> E2eResult<()> {
        loop {
            let response = self.next_response().await?;
            if response.ready {
                return Ok(());
            }
        }
    }

    async fn next_response(&mut self) -> E2eResult<Response> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await?
                .ok_or_else(|| E2eError::Bridge("bridge exited".into()))?;

            match serde_json::from_str::<Response>(&line) {
                Ok(response) => return Ok(response),
                Err(_) => debug!(target: "swiftcheck::bridge", "ignoring stdout line: {}", line),
            }
        }
    }

    async fn request(&mut self, request: Request<'_>) -> E2eResult<serde_json::Value> {
        if self.closed {
            return Err(E2eError::Bridge("session already closed".into()));
        }

        self.next_id += 1;
        let id = self.next_id;
        let mut line = serde_json::to_string(&Envelope { id, request })?;
        line.push('\n');

        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let limit = self.request_timeout;
        let response = timeout(limit, async {
            loop {
                let response = self.next_response().await?;
                if response.id == Some(id) {
                    return Ok::<_, E2eError>(response);
                }
                warn!("Discarding out-of-order bridge response {:?}", response.id);
            }
        })
        .await
        .map_err(|_| E2eError::Bridge(format!("no response within {} ms", limit.as_millis())))??;

        response.into_result()
    }

    async fn request_unit(&mut self, request: Request<'_>) -> E2eResult<()> {
        self.request(request).await.map(|_| ())
    }

    /// Ask the script to exit, then escalate to SIGTERM and kill
    async fn shutdown(&mut self) {
        if !self.closed {
            match timeout(EXIT_GRACE, self.request(Request::Close)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("Bridge close request failed: {}", e),
                Err(_) => debug!("Bridge did not acknowledge close"),
            }
            self.closed = true;
        }

        if let Ok(Ok(_)) = timeout(EXIT_GRACE, self.child.wait()).await {
            return;
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    if let Ok(Ok(_)) = timeout(Duration::from_millis(500), self.child.wait()).await {
                        return;
                    }
                }
            }
        }

        let _ = self.child.kill().await;
    }
}

#[async_trait]
impl BrowserPage for PlaywrightSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> E2eResult<Navigation> {
        let result = self
            .request(Request::Goto {
                url,
                timeout_ms: timeout.as_millis() as u64,
            })
            .await?;
        let goto: GotoResult = serde_json::from_value(result)?;
        Ok(Navigation { status: goto.status })
    }

    async fn wait_for_network_idle(&mut self, timeout: Duration) -> E2eResult<()> {
        self.request_unit(Request::NetworkIdle {
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
    }

    async fn find_textbox(&mut self, accessible_name: &str) -> E2eResult<Option<NodeHandle>> {
        let result = self
            .request(Request::FindTextbox {
                name: accessible_name,
            })
            .await?;
        Ok(serde_json::from_value::<Option<String>>(result)?.map(NodeHandle))
    }

    async fn clear(&mut self, node: &NodeHandle) -> E2eResult<()> {
        self.request_unit(Request::Clear { handle: &node.0 }).await
    }

    async fn fill(&mut self, node: &NodeHandle, text: &str) -> E2eResult<()> {
        self.request_unit(Request::Fill {
            handle: &node.0,
            text,
        })
        .await
    }

    async fn press_sequentially(
        &mut self,
        node: &NodeHandle,
        text: &str,
        delay: Duration,
    ) -> E2eResult<()> {
        self.request_unit(Request::PressSequentially {
            handle: &node.0,
            text,
            delay_ms: delay.as_millis() as u64,
        })
        .await
    }

    async fn query_nodes(&mut self, selector: &str) -> E2eResult<Vec<NodeSnapshot>> {
        let result = self.request(Request::QueryNodes { selector }).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn close(&mut self) -> E2eResult<()> {
        self.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let line = serde_json::to_value(Envelope {
            id: 7,
            request: Request::PressSequentially {
                handle: "sc-1",
                text: "mama kae",
                delay_ms: 150,
            },
        })
        .unwrap();

        assert_eq!(
            line,
            json!({"id": 7, "op": "pressSequentially", "handle": "sc-1", "text": "mama kae", "delay_ms": 150})
        );

        let close = serde_json::to_value(Envelope { id: 8, request: Request::Close }).unwrap();
        assert_eq!(close, json!({"id": 8, "op": "close"}));
    }

    #[test]
    fn test_script_handles_every_op() {
        for op in [
            "goto",
            "networkIdle",
            "findTextbox",
            "clear",
            "fill",
            "pressSequentially",
            "queryNodes",
            "'close'",
        ] {
            assert!(BRIDGE_SCRIPT.contains(op), "script does not handle {}", op);
        }
    }

    #[test]
    fn test_fault_becomes_bridge_error() {
        let response: Response = serde_json::from_str(
            r#"{"id": 3, "ok": false, "error": {"kind": "timeout", "message": "Timeout 30000ms exceeded"}}"#,
        )
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, E2eError::Bridge(ref msg) if msg.starts_with("timeout:")));
    }

    #[test]
    fn test_query_nodes_result_decodes() {
        let response: Response = serde_json::from_str(
            r#"{"id": 4, "ok": true, "result": [
                {"handle": "sc-1", "tag": "TEXTAREA", "role": null, "text": ""},
                {"handle": "sc-2", "tag": "DIV", "role": null, "text": " මම \n"}
            ]}"#,
        )
        .unwrap();
        let nodes: Vec<NodeSnapshot> = serde_json::from_value(response.into_result().unwrap()).unwrap();

        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_text_entry());
        assert_eq!(nodes[1].handle, NodeHandle("sc-2".into()));
        assert_eq!(nodes[1].text, " මම \n");
    }

    #[test]
    fn test_ready_line() {
        let response: Response = serde_json::from_str(r#"{"ready": true}"#).unwrap();
        assert!(response.ready);
        assert_eq!(response.id, None);
    }
}
