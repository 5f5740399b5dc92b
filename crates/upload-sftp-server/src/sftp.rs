//! SFTP subsystem handler.
//!
//! Adapts russh-sftp's typed requests onto a [`SessionFilesystem`]. Wire
//! framing lives in russh-sftp; this layer only converts handles, attributes
//! and errors.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use russh_sftp::protocol::{
    Attrs, Data, File, FileAttributes, Handle as SftpHandle, Name, OpenFlags, Status, StatusCode,
    Version,
};
use tracing::Instrument;
use upload_sftp_vfs::handle::{self, Handle};
use upload_sftp_vfs::{FileAttr, NameEntry, SessionFilesystem, VfsError, Verb};

/// One SFTP subsystem instance, bound to its connection's filesystem.
pub struct SftpSession {
    fs: SessionFilesystem,
}

impl SftpSession {
    pub fn new(fs: SessionFilesystem) -> Self {
        Self { fs }
    }

    fn span(&self, verb: Verb, id: u32) -> tracing::Span {
        let user = self
            .fs
            .current_user()
            .map(|identity| identity.into_string())
            .unwrap_or_default();
        tracing::info_span!("sftp.request", verb = %verb, id, user = %user)
    }
}

fn ok(id: u32) -> Status {
    Status {
        id,
        status_code: StatusCode::Ok,
        error_message: "Ok".into(),
        language_tag: "en-US".into(),
    }
}

/// Collapse a VFS error into the client's binary status vocabulary.
fn status(verb: Verb, err: VfsError) -> StatusCode {
    match err {
        VfsError::EndOfFile => StatusCode::Eof,
        VfsError::Unsupported(rejected) if rejected.is_rejected() => {
            tracing::debug!("{verb} rejected");
            StatusCode::Failure
        }
        e => {
            tracing::warn!("{verb} failed: {e}");
            StatusCode::Failure
        }
    }
}

fn wire_handle(verb: Verb, handle: &Handle) -> Result<String, StatusCode> {
    handle::decode(handle).map_err(|e| status(verb, e))
}

fn unix_secs(time: SystemTime) -> u32 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

fn to_attributes(attr: &FileAttr) -> FileAttributes {
    let mut attrs = FileAttributes::default();
    attrs.size = Some(attr.size);
    attrs.uid = Some(attr.uid);
    attrs.gid = Some(attr.gid);
    attrs.permissions = Some(attr.perm);
    attrs.atime = Some(unix_secs(attr.atime));
    attrs.mtime = Some(unix_secs(attr.mtime));
    attrs
}

fn to_file(entry: NameEntry) -> File {
    File {
        attrs: to_attributes(&entry.attrs),
        filename: entry.filename,
        longname: entry.longname,
    }
}

impl russh_sftp::server::Handler for SftpSession {
    type Error = StatusCode;

    fn unimplemented(&self) -> Self::Error {
        StatusCode::OpUnsupported
    }

    async fn init(
        &mut self,
        version: u32,
        _extensions: HashMap<String, String>,
    ) -> Result<Version, Self::Error> {
        tracing::debug!(version, "SFTP session accepted");
        Ok(Version::new())
    }

    async fn open(
        &mut self,
        id: u32,
        filename: String,
        pflags: OpenFlags,
        _attrs: FileAttributes,
    ) -> Result<SftpHandle, Self::Error> {
        let span = self.span(Verb::Open, id);
        async {
            tracing::debug!(%filename, ?pflags, "OPEN");
            let handle = self.fs.open(&filename).map_err(|e| status(Verb::Open, e))?;
            Ok::<_, StatusCode>(SftpHandle {
                id,
                handle: wire_handle(Verb::Open, &handle)?,
            })
        }
        .instrument(span)
        .await
    }

    async fn close(&mut self, id: u32, handle: String) -> Result<Status, Self::Error> {
        let span = self.span(Verb::Close, id);
        async {
            tracing::debug!(%handle, "CLOSE");
            self.fs
                .close(id, &Handle::from(handle))
                .await
                .map_err(|e| status(Verb::Close, e))?;
            Ok::<_, StatusCode>(ok(id))
        }
        .instrument(span)
        .await
    }

    async fn read(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        len: u32,
    ) -> Result<Data, Self::Error> {
        let data = self
            .fs
            .read(&Handle::from(handle), offset, len)
            .map_err(|e| status(Verb::Read, e))?;
        Ok(Data { id, data })
    }

    async fn write(
        &mut self,
        id: u32,
        handle: String,
        offset: u64,
        data: Vec<u8>,
    ) -> Result<Status, Self::Error> {
        let span = self.span(Verb::Write, id);
        async {
            tracing::trace!(%handle, offset, len = data.len(), "WRITE");
            self.fs
                .write(&Handle::from(handle), offset, &data)
                .await
                .map_err(|e| status(Verb::Write, e))?;
            Ok::<_, StatusCode>(ok(id))
        }
        .instrument(span)
        .await
    }

    async fn opendir(&mut self, id: u32, path: String) -> Result<SftpHandle, Self::Error> {
        tracing::debug!(%path, "OPENDIR");
        let handle = self.fs.opendir(&path).map_err(|e| status(Verb::Opendir, e))?;
        Ok(SftpHandle {
            id,
            handle: wire_handle(Verb::Opendir, &handle)?,
        })
    }

    async fn readdir(&mut self, id: u32, handle: String) -> Result<Name, Self::Error> {
        let files = self
            .fs
            .readdir(&Handle::from(handle))
            .map_err(|e| status(Verb::Readdir, e))?;
        Ok(Name {
            id,
            files: files.into_iter().map(to_file).collect(),
        })
    }

    async fn realpath(&mut self, id: u32, path: String) -> Result<Name, Self::Error> {
        tracing::debug!(%path, "REALPATH");
        let files = self.fs.realpath(&path).map_err(|e| status(Verb::Realpath, e))?;
        Ok(Name {
            id,
            files: files.into_iter().map(to_file).collect(),
        })
    }

    async fn stat(&mut self, id: u32, path: String) -> Result<Attrs, Self::Error> {
        let attr = self.fs.stat(&path).map_err(|e| status(Verb::Stat, e))?;
        Ok(Attrs {
            id,
            attrs: to_attributes(&attr),
        })
    }

    async fn fstat(&mut self, id: u32, handle: String) -> Result<Attrs, Self::Error> {
        let attr = self
            .fs
            .fstat(&Handle::from(handle))
            .map_err(|e| status(Verb::Fstat, e))?;
        Ok(Attrs {
            id,
            attrs: to_attributes(&attr),
        })
    }

    async fn mkdir(
        &mut self,
        id: u32,
        path: String,
        _attrs: FileAttributes,
    ) -> Result<Status, Self::Error> {
        tracing::debug!(%path, "MKDIR");
        self.fs.mkdir(&path).map_err(|e| status(Verb::Mkdir, e))?;
        Ok(ok(id))
    }

    async fn remove(&mut self, id: u32, filename: String) -> Result<Status, Self::Error> {
        tracing::debug!(%filename, "REMOVE");
        self.fs.remove(&filename).map_err(|e| status(Verb::Remove, e))?;
        Ok(ok(id))
    }

    async fn rmdir(&mut self, id: u32, path: String) -> Result<Status, Self::Error> {
        tracing::debug!(%path, "RMDIR");
        self.fs.rmdir(&path).map_err(|e| status(Verb::Rmdir, e))?;
        Ok(ok(id))
    }

    async fn rename(
        &mut self,
        id: u32,
        oldpath: String,
        newpath: String,
    ) -> Result<Status, Self::Error> {
        tracing::debug!(%oldpath, %newpath, "RENAME");
        self.fs
            .rename(&oldpath, &newpath)
            .map_err(|e| status(Verb::Rename, e))?;
        Ok(ok(id))
    }
}
