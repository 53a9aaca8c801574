//! Retrieves information about the version of the harness from Git and the
//! build environment. It is reported on startup so that benchmark logs can be
//! traced back to the exact build that produced them.

fn main() -> shadow_rs::SdResult<()> {
    shadow_rs::new()
}
