pub(crate) mod concepts;
pub(crate) mod limits;
pub(crate) mod migrate;
pub(crate) mod shared;
pub(crate) mod space;
pub(crate) mod status;
