pub mod error;
pub mod iobuffer;
pub mod key;
pub mod package;
pub mod provider;
pub mod refpack;

pub use error::{DbpfError, Result};
pub use iobuffer::IoBuffer;
pub use key::{group_hash, ResourceKey, DIR_KEY, LOCAL_GROUP};
pub use package::{
    Asset, AssetCodec, AssetRecord, Changes, CodecContext, CodecRegistry, DirCodec, DirResource,
    Entry, Package, PackageId, PackageState,
};
pub use provider::{ContentProvider, SharedProvider};
