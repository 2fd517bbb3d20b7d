//! OCI image layouts, registries and the local image store.
//!
//! ```text
//! package/
//! ├── oci-layout
//! ├── index.json          (written last)
//! └── blobs/sha256/
//!     ├── <manifest>
//!     ├── <config>        (labels, diff_ids)
//!     └── <layers>
//! ```

mod image;
pub mod layout;
pub mod reference;
pub mod registry;
mod remote;
pub mod store;

pub use image::{ImageDestination, LayoutImage, LAYER_MEDIA_TYPE};
pub use layout::{read_layout, LayoutContents, LayoutLayer, OciLayoutPackage};
pub use reference::ImageReference;
pub use registry::{RegistryAuth, RegistryPuller, RegistryPusher};
pub use remote::{LayoutImageFactory, RegistryImageFetcher};
pub use store::ImageStore;
