//! The client surface: one method per daemon operation.

use std::sync::Arc;

use tracing::debug;

use crate::bus::SharedBus;
use crate::connection::ConnectionManager;
use crate::executor::{CallTimeout, Executor, Reply};
use crate::handle::{DirectoryHandle, FileHandle};
use crate::monitor::{MonitorCallback, MonitorHandle, MonitorRegistry};
use crate::wire::{Arg, ReplyCursor, method};
use crate::{
    CallbackHandler, Cancellation, ClientConfig, Connector, FileInfo, FileInfoOptions, FindDirectoryKind,
    MonitorType, OpenMode, SeekPosition, SetFileInfoMask, Uri, VfsError, VfsResult,
};

/// Forwards filesystem operations to the daemon.
///
/// Each calling thread gets its own private connection. Handles returned
/// here must stay on the thread that opened them.
pub struct DaemonClient {
    exec: Executor,
    bus: Arc<SharedBus>,
    config: ClientConfig,
}

impl DaemonClient {
    pub fn new(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self::build(config, connector, None)
    }

    /// Like [`new`](Self::new), answering daemon callbacks with `handler`.
    pub fn with_callback_handler(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn CallbackHandler>,
    ) -> Self {
        Self::build(config, connector, Some(handler))
    }

    fn build(config: ClientConfig, connector: Arc<dyn Connector>, callbacks: Option<Arc<dyn CallbackHandler>>) -> Self {
        let bus = Arc::new(SharedBus::new(connector.clone(), Arc::new(MonitorRegistry::new())));
        let connections = ConnectionManager::new(bus.clone(), connector, callbacks, config.bootstrap_timeout);
        Self { exec: Executor::new(connections, &config), bus, config }
    }

    /// A client over the Unix socket named in `config`.
    #[cfg(unix)]
    pub fn from_config(config: ClientConfig) -> Self {
        let connector = Arc::new(crate::transport::unix::UnixConnector::new(&config));
        Self::new(config, connector)
    }

    /// The process-wide client, configured from the environment on first use.
    #[cfg(unix)]
    pub fn global() -> &'static DaemonClient {
        use std::sync::OnceLock;

        static CLIENT: OnceLock<DaemonClient> = OnceLock::new();
        CLIENT.get_or_init(|| DaemonClient::from_config(ClientConfig::from_env()))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn monitors(&self) -> &Arc<MonitorRegistry> {
        self.bus.monitors()
    }

    /// The daemon's id for this thread's private connection.
    pub fn connection_id(&self) -> VfsResult<i32> {
        self.exec.connections().with_connection(|conn| Ok(conn.conn_id()))
    }

    /// Closes this thread's private connection; the next call bootstraps a
    /// fresh one. Handles opened on the old connection become meaningless.
    pub fn drop_thread_connection(&self) -> bool {
        self.exec.connections().close_current()
    }

    fn call(&self, name: &str, args: Vec<Arg>, cancel: Option<&Cancellation>) -> VfsResult<ReplyCursor> {
        self.exec.call(name, args, cancel, CallTimeout::Default)
    }

    pub fn open(&self, uri: &Uri, mode: OpenMode, cancel: Option<&Cancellation>) -> VfsResult<FileHandle> {
        FileHandle::open(&self.exec, uri, mode, cancel)
    }

    pub fn create(
        &self,
        uri: &Uri,
        mode: OpenMode,
        exclusive: bool,
        perm: u32,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<FileHandle> {
        FileHandle::create(&self.exec, uri, mode, exclusive, perm, cancel)
    }

    pub fn close(&self, handle: &mut FileHandle, cancel: Option<&Cancellation>) -> VfsResult<()> {
        handle.close(&self.exec, cancel)
    }

    pub fn read(&self, handle: &mut FileHandle, buf: &mut [u8], cancel: Option<&Cancellation>) -> VfsResult<usize> {
        handle.read(&self.exec, buf, cancel)
    }

    /// Bytes the daemon accepted. A short count is not an error.
    pub fn write(&self, handle: &mut FileHandle, data: &[u8], cancel: Option<&Cancellation>) -> VfsResult<u64> {
        handle.write(&self.exec, data, cancel)
    }

    pub fn seek(
        &self,
        handle: &mut FileHandle,
        whence: SeekPosition,
        offset: i64,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<()> {
        handle.seek(&self.exec, whence, offset, cancel)
    }

    pub fn tell(&self, handle: &FileHandle) -> VfsResult<i64> {
        handle.tell(&self.exec)
    }

    pub fn truncate_handle(&self, handle: &mut FileHandle, length: u64, cancel: Option<&Cancellation>) -> VfsResult<()> {
        handle.truncate(&self.exec, length, cancel)
    }

    pub fn open_directory(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<DirectoryHandle> {
        DirectoryHandle::open(&self.exec, uri, options, cancel)
    }

    pub fn close_directory(&self, handle: &mut DirectoryHandle, cancel: Option<&Cancellation>) -> VfsResult<()> {
        handle.close(&self.exec, cancel)
    }

    pub fn read_directory(&self, handle: &mut DirectoryHandle, cancel: Option<&Cancellation>) -> VfsResult<FileInfo> {
        handle.read_next(&self.exec, cancel)
    }

    pub fn get_file_info(
        &self,
        uri: &Uri,
        options: FileInfoOptions,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<FileInfo> {
        let args = vec![Arg::from(uri), Arg::Int32(options.bits() as i32)];
        self.call(method::GET_FILE_INFO, args, cancel)?.next_file_info()
    }

    pub fn get_file_info_from_handle(
        &self,
        handle: &FileHandle,
        options: FileInfoOptions,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<FileInfo> {
        handle.file_info(&self.exec, options, cancel)
    }

    pub fn is_local(&self, uri: &Uri) -> VfsResult<bool> {
        self.call(method::IS_LOCAL, vec![Arg::from(uri)], None)?.next_bool()
    }

    pub fn make_directory(&self, uri: &Uri, perm: u32, cancel: Option<&Cancellation>) -> VfsResult<()> {
        self.call(method::MAKE_DIRECTORY, vec![Arg::from(uri), Arg::Int32(perm as i32)], cancel)?;
        Ok(())
    }

    pub fn remove_directory(&self, uri: &Uri, cancel: Option<&Cancellation>) -> VfsResult<()> {
        self.call(method::REMOVE_DIRECTORY, vec![Arg::from(uri)], cancel)?;
        Ok(())
    }

    pub fn move_uri(&self, old: &Uri, new: &Uri, force_replace: bool, cancel: Option<&Cancellation>) -> VfsResult<()> {
        let args = vec![Arg::from(old), Arg::from(new), Arg::Bool(force_replace)];
        self.call(method::MOVE, args, cancel)?;
        Ok(())
    }

    pub fn unlink(&self, uri: &Uri, cancel: Option<&Cancellation>) -> VfsResult<()> {
        self.call(method::UNLINK, vec![Arg::from(uri)], cancel)?;
        Ok(())
    }

    pub fn check_same_fs(&self, a: &Uri, b: &Uri, cancel: Option<&Cancellation>) -> VfsResult<bool> {
        self.call(method::CHECK_SAME_FS, vec![Arg::from(a), Arg::from(b)], cancel)?.next_bool()
    }

    pub fn set_file_info(
        &self,
        uri: &Uri,
        info: &FileInfo,
        mask: SetFileInfoMask,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<()> {
        let args = vec![Arg::from(uri), Arg::from(info), Arg::Int32(mask.bits() as i32)];
        self.call(method::SET_FILE_INFO, args, cancel)?;
        Ok(())
    }

    pub fn truncate(&self, uri: &Uri, length: u64, cancel: Option<&Cancellation>) -> VfsResult<()> {
        self.call(method::TRUNCATE, vec![Arg::from(uri), Arg::UInt64(length)], cancel)?;
        Ok(())
    }

    pub fn find_directory(
        &self,
        near: &Uri,
        kind: FindDirectoryKind,
        create_if_needed: bool,
        find_if_needed: bool,
        perm: u32,
        cancel: Option<&Cancellation>,
    ) -> VfsResult<Uri> {
        let args = vec![
            Arg::from(near),
            Arg::Int32(kind as i32),
            Arg::Bool(create_if_needed),
            Arg::Bool(find_if_needed),
            Arg::Int32(perm as i32),
        ];
        self.call(method::FIND_DIRECTORY, args, cancel)?.next_uri()
    }

    pub fn create_symbolic_link(&self, uri: &Uri, target: &str, cancel: Option<&Cancellation>) -> VfsResult<()> {
        self.call(method::CREATE_SYMBOLIC_LINK, vec![Arg::from(uri), Arg::from(target)], cancel)?;
        Ok(())
    }

    pub fn get_volume_free_space(&self, uri: &Uri) -> VfsResult<u64> {
        self.call(method::GET_VOLUME_FREE_SPACE, vec![Arg::from(uri)], None)?.next_u64()
    }

    /// Subscribes `callback` to changes at `uri`. Notifications arrive on
    /// the shared connection's dispatcher thread. Not callable from inside
    /// a monitor callback.
    pub fn monitor_add(&self, uri: &Uri, kind: MonitorType, callback: MonitorCallback) -> VfsResult<MonitorHandle> {
        let args = vec![Arg::from(uri), Arg::Int32(kind as i32)];
        let fields = self.bus.call(method::MONITOR_ADD, args, self.config.default_timeout)?;
        let id = Reply::parse(fields)?.check()?.next_i32()?;
        let handle = self.monitors().subscribe(id, callback)?;
        debug!(id, %uri, "monitor added");
        Ok(handle)
    }

    /// Stops delivery before telling the daemon, so nothing arrives for
    /// `handle` once this returns. Handles from before a shared-connection
    /// loss are refused without contacting the daemon.
    ///
    /// From inside a monitor callback the daemon is told without waiting
    /// for its answer.
    pub fn monitor_cancel(&self, handle: MonitorHandle) -> VfsResult<()> {
        let id = handle.id();
        if !self.monitors().unsubscribe(&handle) {
            return Err(VfsError::precondition(format_args!("monitor {id} is not registered")));
        }
        if self.bus.on_dispatcher_thread() {
            self.bus.notify(method::MONITOR_CANCEL, vec![Arg::Int32(id)])?;
            debug!(id, "monitor cancelled from its callback");
            return Ok(());
        }
        let fields = self.bus.call(method::MONITOR_CANCEL, vec![Arg::Int32(id)], self.config.default_timeout)?;
        Reply::parse(fields)?.check()?;
        debug!(id, "monitor cancelled");
        Ok(())
    }
}
