use crate::prelude::*;

use crate::handles;
use crate::status::Status;
use adapter_protocol::*;

impl super::DebugSession {
    /// Two scopes per frame: the globals of the user's translation unit and
    /// the frame's locals. The references are fixed by frame id, so a
    /// stateless client can re-request them at any stop.
    pub(super) fn handle_scopes(&mut self, args: ScopesArguments) -> Result<ScopesResponseBody, Error> {
        Ok(ScopesResponseBody {
            scopes: vec![
                Scope {
                    name: "Global".into(),
                    variables_reference: handles::GLOBAL_SCOPE_REFERENCE,
                    expensive: false,
                },
                Scope {
                    name: "Local".into(),
                    variables_reference: handles::scopes_reference(args.frame_id),
                    expensive: false,
                },
            ],
        })
    }

    pub(super) async fn handle_variables(
        &mut self,
        args: VariablesArguments,
    ) -> Result<VariablesResponseBody, Error> {
        if !self.status.is(Status::Stopped) {
            bail!(blame_user(str_error("程序未暂停变量信息")));
        }
        let variables = self.expander.variables(args.variables_reference).await?;
        Ok(VariablesResponseBody { variables })
    }
}
