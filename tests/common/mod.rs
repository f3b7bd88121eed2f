//! In-process daemon used by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use vfsd_client::transport::memory::{self, MemoryListener, SHARED_ADDRESS};
use vfsd_client::wire::{Arg, Message, WireFileInfo, method};
use vfsd_client::{
    CallbackHandler, ClientConfig, Connector, DaemonClient, Duplex, FileInfo, FileInfoFields, FileType, MessageSink, MessageSource, ResultCode,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the fake reports the end of a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EofStyle {
    /// A successful reply carrying zero entries.
    #[default]
    EmptyChunk,
    /// A reply coded EOF after the last chunk.
    EofCode,
    /// The last chunk itself arrives coded EOF.
    EofWithLastChunk,
}

#[derive(Debug, Clone)]
pub struct Logged {
    pub conn: i32,
    pub method: String,
    pub args: Vec<Arg>,
}

impl Logged {
    /// The trailing cancellation token, if the call carried one.
    pub fn token(&self) -> Option<i32> {
        if self.args.len() <= arity(&self.method) {
            return None;
        }
        match self.args.last() {
            Some(Arg::Int32(t)) => Some(*t),
            _ => None,
        }
    }
}

#[derive(Default)]
pub struct State {
    pub calls: Vec<Logged>,
    pub cancels: Vec<(i32, i32)>,
    pub bootstraps: usize,
    pub files: HashMap<String, Vec<u8>>,
    pub dirs: HashMap<String, Vec<Vec<FileInfo>>>,
    pub eof_style: EofStyle,
    pub delays: HashMap<String, Duration>,
    pub failures: HashMap<String, ResultCode>,
    pub short_write: Option<u64>,
    /// Private connections are dropped on receiving this method.
    pub sever: Option<String>,
    pub monitors: Vec<i32>,
    pub callback_answers: Vec<Message>,
}

pub struct FakeDaemon {
    pub state: Mutex<State>,
    /// The live shared connection's sink, tagged with its serve loop.
    shared_sink: Mutex<Option<(usize, Box<dyn MessageSink>)>>,
    shared_epoch: AtomicUsize,
    next_conn: AtomicI32,
    next_id: AtomicI32,
}

/// Daemon-side state of one open file.
struct OpenFile {
    uri: String,
    pos: usize,
}

impl FakeDaemon {
    pub fn start() -> (Arc<Self>, DaemonClient) {
        Self::start_with(ClientConfig::default())
    }

    pub fn start_with(config: ClientConfig) -> (Arc<Self>, DaemonClient) {
        let (daemon, connector) = Self::launch();
        (daemon, DaemonClient::new(config, connector))
    }

    pub fn start_with_handler(handler: Arc<dyn CallbackHandler>) -> (Arc<Self>, DaemonClient) {
        let (daemon, connector) = Self::launch();
        (daemon, DaemonClient::with_callback_handler(ClientConfig::default(), connector, handler))
    }

    fn launch() -> (Arc<Self>, Arc<dyn Connector>) {
        init_tracing();
        let (connector, listener) = memory::endpoint();
        let daemon = Arc::new(FakeDaemon {
            state: Mutex::new(State::default()),
            shared_sink: Mutex::new(None),
            shared_epoch: AtomicUsize::new(0),
            next_conn: AtomicI32::new(1),
            next_id: AtomicI32::new(100),
        });
        let d = daemon.clone();
        thread::spawn(move || d.accept_loop(listener));
        (daemon, Arc::new(connector))
    }

    pub fn put_file(&self, uri: &str, data: &[u8]) {
        self.state.lock().files.insert(uri.to_owned(), data.to_vec());
    }

    pub fn file(&self, uri: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(uri).cloned()
    }

    pub fn put_dir(&self, uri: &str, chunks: Vec<Vec<FileInfo>>) {
        self.state.lock().dirs.insert(uri.to_owned(), chunks);
    }

    pub fn set_eof_style(&self, style: EofStyle) {
        self.state.lock().eof_style = style;
    }

    pub fn delay(&self, method: &str, by: Duration) {
        self.state.lock().delays.insert(method.to_owned(), by);
    }

    pub fn fail(&self, method: &str, code: ResultCode) {
        self.state.lock().failures.insert(method.to_owned(), code);
    }

    pub fn set_short_write(&self, max: u64) {
        self.state.lock().short_write = Some(max);
    }

    /// Drops the private connection that sends `method`, without replying.
    pub fn sever(&self, method: &str) {
        self.state.lock().sever = Some(method.to_owned());
    }

    /// Closes the shared connection from the daemon side, forgetting its
    /// monitors.
    pub fn drop_shared(&self) {
        self.shared_sink.lock().take();
        self.state.lock().monitors.clear();
    }

    pub fn calls_of(&self, method: &str) -> Vec<Logged> {
        self.state.lock().calls.iter().filter(|c| c.method == method).cloned().collect()
    }

    pub fn bootstraps(&self) -> usize {
        self.state.lock().bootstraps
    }

    pub fn cancels(&self) -> Vec<(i32, i32)> {
        self.state.lock().cancels.clone()
    }

    pub fn monitors(&self) -> Vec<i32> {
        self.state.lock().monitors.clone()
    }

    /// Sends a change notification on the shared connection.
    pub fn emit(&self, id: i32, uri: &str, event: i32) -> bool {
        let signal = Message::signal(
            method::MONITOR_SIGNAL,
            vec![Arg::Int32(id), Arg::Str(uri.to_owned()), Arg::Int32(event)],
        );
        match self.shared_sink.lock().as_mut() {
            Some((_, sink)) => sink.send(&signal).is_ok(),
            None => false,
        }
    }

    fn accept_loop(self: Arc<Self>, listener: MemoryListener) {
        while let Some((address, duplex)) = listener.accept() {
            let d = self.clone();
            if address == SHARED_ADDRESS {
                thread::spawn(move || d.serve_shared(duplex));
            } else {
                let conn = address.trim_start_matches("private-").parse().unwrap_or(-1);
                thread::spawn(move || d.serve_private(conn, duplex));
            }
        }
    }

    fn serve_shared(&self, duplex: Duplex) {
        let Duplex { sink, mut source } = duplex;
        let epoch = self.shared_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        *self.shared_sink.lock() = Some((epoch, sink));
        // Monitor ids are scoped to the shared connection.
        let mut next_monitor = 7;

        while let Ok(msg) = source.recv(None) {
            let Message::Call { serial, method: m, args, no_reply } = msg else {
                continue;
            };
            let fields = match m.as_str() {
                method::GET_CONNECTION => {
                    let id = self.next_conn.fetch_add(1, Ordering::SeqCst);
                    self.state.lock().bootstraps += 1;
                    vec![Arg::Str(format!("private-{id}")), Arg::Int32(id)]
                }
                method::MONITOR_ADD => {
                    let id = next_monitor;
                    next_monitor += 1;
                    self.state.lock().monitors.push(id);
                    ok(vec![Arg::Int32(id)])
                }
                method::MONITOR_CANCEL => {
                    let id = int(&args, 0);
                    self.state.lock().monitors.retain(|m| *m != id);
                    ok(Vec::new())
                }
                _ => code(ResultCode::NOT_SUPPORTED),
            };
            if no_reply {
                continue;
            }
            match self.shared_sink.lock().as_mut() {
                Some((live, sink)) if *live == epoch => {
                    let _ = sink.send(&Message::reply(serial, fields));
                }
                _ => break,
            }
        }

        let mut shared = self.shared_sink.lock();
        if shared.as_ref().is_some_and(|(live, _)| *live == epoch) {
            *shared = None;
        }
    }

    fn serve_private(&self, conn: i32, duplex: Duplex) {
        let Duplex { mut sink, mut source } = duplex;
        let mut files: HashMap<i32, OpenFile> = HashMap::new();
        let mut dirs: HashMap<i32, VecDeque<Vec<FileInfo>>> = HashMap::new();

        while let Ok(msg) = source.recv(None) {
            let Message::Call { serial, method: m, args, .. } = msg else {
                continue;
            };
            if m == method::CANCEL {
                self.state.lock().cancels.push((conn, int(&args, 0)));
                continue;
            }

            let logged = Logged { conn, method: m.clone(), args: args.clone() };
            let token = logged.token();
            self.state.lock().calls.push(logged);

            if self.state.lock().sever.as_deref() == Some(m.as_str()) {
                return;
            }

            let delay = self.state.lock().delays.get(&m).copied();
            if let Some(delay) = delay {
                if self.wait_or_cancel(conn, &mut source, delay, token) {
                    let _ = sink.send(&Message::reply(serial, code(ResultCode::CANCELLED)));
                    continue;
                }
            }

            if m == method::OPEN && uri(&args, 0) == "file:///secret" && !self.ask_auth(&mut sink, &mut source) {
                let _ = sink.send(&Message::reply(serial, code(ResultCode::ACCESS_DENIED)));
                continue;
            }

            let failure = self.state.lock().failures.get(&m).copied();
            let fields = match failure {
                Some(failure) => code(failure),
                None => self.handle(&m, &args, &mut files, &mut dirs),
            };
            let _ = sink.send(&Message::reply(serial, fields));
        }
    }

    /// Waits out `delay`, watching for a cancel of `token`.
    fn wait_or_cancel(&self, conn: i32, source: &mut Box<dyn MessageSource>, delay: Duration, token: Option<i32>) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            match source.recv(Some(left)) {
                Ok(Message::Call { method: m, args, .. }) if m == method::CANCEL => {
                    let cancelled = int(&args, 0);
                    self.state.lock().cancels.push((conn, cancelled));
                    if token == Some(cancelled) {
                        return true;
                    }
                }
                Ok(_) => {}
                Err(_) => return false,
            }
        }
    }

    fn ask_auth(&self, sink: &mut Box<dyn MessageSink>, source: &mut Box<dyn MessageSource>) -> bool {
        let request = Message::call(9000, method::CALLBACK, vec![Arg::Str("auth".into()), Arg::Str("file:///secret".into())]);
        if sink.send(&request).is_err() {
            return false;
        }
        let Ok(answer) = source.recv(Some(Duration::from_secs(5))) else {
            return false;
        };
        let granted = matches!(&answer, Message::Reply { reply_to: 9000, args } if args.first() == Some(&Arg::Bool(true)));
        self.state.lock().callback_answers.push(answer);
        granted
    }

    fn handle(
        &self,
        m: &str,
        args: &[Arg],
        files: &mut HashMap<i32, OpenFile>,
        dirs: &mut HashMap<i32, VecDeque<Vec<FileInfo>>>,
    ) -> Vec<Arg> {
        let mut state = self.state.lock();
        match m {
            method::OPEN => {
                let uri = uri(args, 0);
                if !state.files.contains_key(&uri) {
                    return code(ResultCode::NOT_FOUND);
                }
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                files.insert(id, OpenFile { uri, pos: 0 });
                ok(vec![Arg::Int32(id)])
            }
            method::CREATE => {
                let uri = uri(args, 0);
                let exclusive = boolean(args, 2);
                if exclusive && state.files.contains_key(&uri) {
                    return code(ResultCode::FILE_EXISTS);
                }
                state.files.entry(uri.clone()).or_default();
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                files.insert(id, OpenFile { uri, pos: 0 });
                ok(vec![Arg::Int32(id)])
            }
            method::CLOSE => match files.remove(&int(args, 0)) {
                Some(_) => ok(Vec::new()),
                None => code(ResultCode::BAD_FILE),
            },
            method::READ => {
                let Some(file) = files.get_mut(&int(args, 0)) else {
                    return code(ResultCode::BAD_FILE);
                };
                let data = state.files.get(&file.uri).cloned().unwrap_or_default();
                if file.pos >= data.len() {
                    return code(ResultCode::EOF);
                }
                let n = (data.len() - file.pos).min(uint(args, 1) as usize);
                let chunk = data[file.pos..file.pos + n].to_vec();
                file.pos += n;
                ok(vec![Arg::Bytes(chunk)])
            }
            method::WRITE => {
                let Some(file) = files.get_mut(&int(args, 0)) else {
                    return code(ResultCode::BAD_FILE);
                };
                let data = bytes(args, 1);
                let n = state.short_write.map_or(data.len(), |max| data.len().min(max as usize));
                let stored = state.files.entry(file.uri.clone()).or_default();
                stored.truncate(file.pos);
                stored.extend_from_slice(&data[..n]);
                file.pos += n;
                ok(vec![Arg::UInt64(n as u64)])
            }
            method::SEEK => {
                let Some(file) = files.get_mut(&int(args, 0)) else {
                    return code(ResultCode::BAD_FILE);
                };
                let len = state.files.get(&file.uri).map_or(0, Vec::len) as i64;
                let offset = long(args, 2);
                let target = match int(args, 1) {
                    0 => offset,
                    1 => file.pos as i64 + offset,
                    _ => len + offset,
                };
                if target < 0 {
                    return code(ResultCode::BAD_PARAMETERS);
                }
                file.pos = target as usize;
                ok(Vec::new())
            }
            method::TELL => match files.get(&int(args, 0)) {
                Some(file) => ok(vec![Arg::Int64(file.pos as i64)]),
                None => code(ResultCode::BAD_FILE),
            },
            method::TRUNCATE_HANDLE => {
                let Some(file) = files.get(&int(args, 0)) else {
                    return code(ResultCode::BAD_FILE);
                };
                let len = uint(args, 1) as usize;
                if let Some(data) = state.files.get_mut(&file.uri) {
                    data.resize(len, 0);
                }
                ok(Vec::new())
            }
            method::OPEN_DIRECTORY => {
                let Some(chunks) = state.dirs.get(&uri(args, 0)) else {
                    return code(ResultCode::NOT_FOUND);
                };
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                dirs.insert(id, chunks.iter().cloned().collect());
                ok(vec![Arg::Int32(id)])
            }
            method::READ_DIRECTORY => {
                let Some(queue) = dirs.get_mut(&int(args, 0)) else {
                    return code(ResultCode::BAD_FILE);
                };
                let next = queue.pop_front();
                match (next, state.eof_style) {
                    (Some(chunk), EofStyle::EofWithLastChunk) if queue.is_empty() => {
                        vec![Arg::Int32(ResultCode::EOF.0), list(&chunk)]
                    }
                    (Some(chunk), _) => ok(vec![list(&chunk)]),
                    (None, EofStyle::EmptyChunk) => ok(vec![list(&[])]),
                    (None, _) => code(ResultCode::EOF),
                }
            }
            method::CLOSE_DIRECTORY => match dirs.remove(&int(args, 0)) {
                Some(_) => ok(Vec::new()),
                None => code(ResultCode::BAD_FILE),
            },
            method::GET_FILE_INFO => {
                let uri = uri(args, 0);
                match state.files.get(&uri) {
                    Some(data) => ok(vec![Arg::from(&info_for(&uri, data))]),
                    None => code(ResultCode::NOT_FOUND),
                }
            }
            method::GET_FILE_INFO_FROM_HANDLE => {
                let Some(file) = files.get(&int(args, 0)) else {
                    return code(ResultCode::BAD_FILE);
                };
                let data = state.files.get(&file.uri).cloned().unwrap_or_default();
                ok(vec![Arg::from(&info_for(&file.uri, &data))])
            }
            method::MOVE => {
                let (old, new, force) = (uri(args, 0), uri(args, 1), boolean(args, 2));
                if !force && state.files.contains_key(&new) {
                    return code(ResultCode::FILE_EXISTS);
                }
                match state.files.remove(&old) {
                    Some(data) => {
                        state.files.insert(new, data);
                        ok(Vec::new())
                    }
                    None => code(ResultCode::NOT_FOUND),
                }
            }
            method::UNLINK => match state.files.remove(&uri(args, 0)) {
                Some(_) => ok(Vec::new()),
                None => code(ResultCode::NOT_FOUND),
            },
            method::TRUNCATE => match state.files.get_mut(&uri(args, 0)) {
                Some(data) => {
                    data.resize(uint(args, 1) as usize, 0);
                    ok(Vec::new())
                }
                None => code(ResultCode::NOT_FOUND),
            },
            method::IS_LOCAL => ok(vec![Arg::Bool(uri(args, 0).starts_with("file://"))]),
            method::CHECK_SAME_FS => {
                let (a, b) = (uri(args, 0), uri(args, 1));
                ok(vec![Arg::Bool(a.split('/').nth(2) == b.split('/').nth(2))])
            }
            method::FIND_DIRECTORY => ok(vec![Arg::Uri("file:///home/u/.local/share/Trash".into())]),
            method::GET_VOLUME_FREE_SPACE => ok(vec![Arg::UInt64(1 << 30)]),
            method::MAKE_DIRECTORY
            | method::REMOVE_DIRECTORY
            | method::SET_FILE_INFO
            | method::CREATE_SYMBOLIC_LINK => ok(Vec::new()),
            _ => code(ResultCode::NOT_SUPPORTED),
        }
    }
}

/// Argument count of each operation before the optional token.
fn arity(m: &str) -> usize {
    match m {
        method::CLOSE
        | method::TELL
        | method::CLOSE_DIRECTORY
        | method::READ_DIRECTORY
        | method::IS_LOCAL
        | method::REMOVE_DIRECTORY
        | method::UNLINK
        | method::GET_VOLUME_FREE_SPACE => 1,
        method::SEEK | method::MOVE | method::SET_FILE_INFO => 3,
        method::CREATE => 4,
        method::FIND_DIRECTORY => 5,
        _ => 2,
    }
}

pub fn entry(name: &str) -> FileInfo {
    let mut info = FileInfo::new(name);
    info.valid_fields = FileInfoFields::TYPE;
    info.file_type = FileType::Regular;
    info
}

fn info_for(uri: &str, data: &[u8]) -> FileInfo {
    let mut info = entry(uri.rsplit('/').next().unwrap_or(uri));
    info.valid_fields |= FileInfoFields::SIZE;
    info.size = data.len() as u64;
    info
}

fn list(entries: &[FileInfo]) -> Arg {
    Arg::FileInfoList(entries.iter().map(WireFileInfo::from).collect())
}

fn ok(mut rest: Vec<Arg>) -> Vec<Arg> {
    rest.insert(0, Arg::Int32(ResultCode::OK.0));
    rest
}

fn code(result: ResultCode) -> Vec<Arg> {
    vec![Arg::Int32(result.0)]
}

fn int(args: &[Arg], i: usize) -> i32 {
    match &args[i] {
        Arg::Int32(v) => *v,
        other => panic!("arg {i}: expected int32, got {other:?}"),
    }
}

fn long(args: &[Arg], i: usize) -> i64 {
    match &args[i] {
        Arg::Int64(v) => *v,
        other => panic!("arg {i}: expected int64, got {other:?}"),
    }
}

fn uint(args: &[Arg], i: usize) -> u64 {
    match &args[i] {
        Arg::UInt64(v) => *v,
        other => panic!("arg {i}: expected uint64, got {other:?}"),
    }
}

fn boolean(args: &[Arg], i: usize) -> bool {
    match &args[i] {
        Arg::Bool(v) => *v,
        other => panic!("arg {i}: expected bool, got {other:?}"),
    }
}

fn bytes(args: &[Arg], i: usize) -> Vec<u8> {
    match &args[i] {
        Arg::Bytes(v) => v.clone(),
        other => panic!("arg {i}: expected bytes, got {other:?}"),
    }
}

fn uri(args: &[Arg], i: usize) -> String {
    match &args[i] {
        Arg::Uri(v) | Arg::Str(v) => v.clone(),
        other => panic!("arg {i}: expected uri, got {other:?}"),
    }
}
