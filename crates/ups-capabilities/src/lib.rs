//! Concrete adapters for every external tool the Shutdown Sequencer
//! drives: VMs (`virsh`), containers (`podman`/`docker`), mountpoints
//! (`umount`), remote peers (`ssh`), and the local machine (`wall` +
//! `shutdown`). Each trait is co-located with its sole non-test
//! implementation.

mod container;
mod error;
mod fs_sync;
mod local;
mod remote;
mod unmount;
mod vm;

pub use container::{
    detect_runtime, ComposeFile, ContainerController, ContainerRuntime, RuntimeContainerController,
};
pub use error::SequencerStageError;
pub use fs_sync::{FsSync, RealFsSync};
pub use local::{LocalShutdown, SystemShutdown};
pub use remote::{RemotePeer, RemoteShutdown, SshRemoteShutdown};
pub use unmount::{unmount_best_effort, RealUnmounter, Unmounter};
pub use vm::{VMController, VirshController};
