use crate::prelude::*;

use super::STRUCT_VAR;
use crate::mi2_output::{parse_var_children, VarInfo};
use crate::mi2_session::{Mi2Session, OPTION_TIMEOUT};

/// C structs, pointers and arrays all expand through the stock varobj child
/// listing.
pub(super) async fn list_children(mi2: &Mi2Session) -> Result<Vec<VarInfo>, Error> {
    let record = mi2
        .send_with_timeout(
            OPTION_TIMEOUT,
            "var-list-children",
            &["1".to_string(), STRUCT_VAR.to_string()],
        )
        .await?
        .into_result()?;
    Ok(parse_var_children(&record))
}
