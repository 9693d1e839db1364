//! Function-name dispatch.
//!
//! The host hands over a function name and a list of string arguments. The
//! name is parsed into a [`Function`], routed to an [`OperationKind`], the
//! arguments are parsed into a [`Command`], and the outcome is reported as a
//! [`Response`]. Failures never escape as panics; they become responses.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{EngineConfig, FeLocationRouting};
use crate::engine::{Command, OperationKind, Outcome, UpdateEngine};
use crate::error::{ErrorKind, RmaError, RmaResult};
use crate::ledger::Ledger;
use crate::store::RecordStore;

/// Function names accepted from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// `create`
    Create,
    /// `update3b11`
    Update3b11,
    /// `update3b13`
    Update3b13,
    /// `update3b3OrderConfirm`
    Update3b3OrderConfirm,
    /// `update3b3ETA`
    Update3b3Eta,
    /// `update3b3OrderPOD`
    Update3b3OrderPod,
    /// `updateFElocation`
    UpdateFeLocation,
    /// `query`
    Query,
}

impl Function {
    /// Every accepted function, in table order.
    pub const ALL: [Self; 8] = [
        Self::Create,
        Self::Update3b11,
        Self::Update3b13,
        Self::Update3b3OrderConfirm,
        Self::Update3b3Eta,
        Self::Update3b3OrderPod,
        Self::UpdateFeLocation,
        Self::Query,
    ];

    /// Wire name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update3b11 => "update3b11",
            Self::Update3b13 => "update3b13",
            Self::Update3b3OrderConfirm => "update3b3OrderConfirm",
            Self::Update3b3Eta => "update3b3ETA",
            Self::Update3b3OrderPod => "update3b3OrderPOD",
            Self::UpdateFeLocation => "updateFElocation",
            Self::Query => "query",
        }
    }

    /// Operation this function runs under `routing`.
    #[must_use]
    pub const fn route(self, routing: FeLocationRouting) -> OperationKind {
        match self {
            Self::Create => OperationKind::Create,
            Self::Update3b11 => OperationKind::UpdateIntake,
            Self::Update3b13 => OperationKind::UpdateShipmentNotice,
            Self::Update3b3OrderConfirm => OperationKind::UpdateOrderConfirmation,
            Self::Update3b3Eta => OperationKind::UpdateEta,
            Self::Update3b3OrderPod => OperationKind::UpdatePod,
            Self::UpdateFeLocation => match routing {
                FeLocationRouting::Forwarder => OperationKind::UpdateForwarderLocation,
                FeLocationRouting::Legacy => OperationKind::UpdatePod,
            },
            Self::Query => OperationKind::Query,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Function {
    type Err = RmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.name() == s)
            .ok_or_else(|| RmaError::UnknownFunction {
                name: s.to_string(),
                expected: Self::ALL.map(Self::name).join(", "),
            })
    }
}

/// One host call.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Correlates log lines of this call.
    pub request_id: Uuid,
    /// Function name as received.
    pub function: String,
    /// Positional arguments as received.
    pub args: Vec<String>,
}

impl Invocation {
    /// New invocation with a random request id.
    pub fn new(function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            function: function.into(),
            args,
        }
    }

    /// Sets a caller-supplied request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }
}

/// Structured result of a host call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// 200 on success, otherwise [`ErrorKind::status_code`].
    pub status: u16,
    /// Empty on success, the error message otherwise.
    pub message: String,
    /// Failure class, absent on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    /// Result bytes; only `query` produces any.
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
}

impl Response {
    /// Status of a successful call.
    pub const OK: u16 = 200;

    /// Success without a payload.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: Self::OK,
            message: String::new(),
            kind: None,
            payload: None,
        }
    }

    /// Success carrying `payload`.
    #[must_use]
    pub fn ok_with(payload: Vec<u8>) -> Self {
        Self {
            payload: Some(payload),
            ..Self::ok()
        }
    }

    /// Failure response for `err`.
    #[must_use]
    pub fn error(err: &RmaError) -> Self {
        Self {
            status: err.status_code(),
            message: err.to_string(),
            kind: Some(err.kind()),
            payload: None,
        }
    }

    /// Returns true on success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status == Self::OK
    }
}

impl From<RmaResult<Option<Vec<u8>>>> for Response {
    fn from(result: RmaResult<Option<Vec<u8>>>) -> Self {
        match result {
            Ok(None) => Self::ok(),
            Ok(Some(payload)) => Self::ok_with(payload),
            Err(e) => Self::error(&e),
        }
    }
}

/// Entry point for host calls.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    engine: UpdateEngine,
}

impl Dispatcher {
    /// Dispatcher over `ledger` using `config`.
    ///
    /// # Errors
    /// Returns [`RmaError::InvalidConfig`] if `config` fails validation.
    pub fn new(ledger: Arc<dyn Ledger>, config: EngineConfig) -> RmaResult<Self> {
        let store = RecordStore::with_config(ledger, config)?;
        Ok(Self::from_engine(UpdateEngine::new(store)))
    }

    /// Dispatcher over an existing engine.
    #[must_use]
    pub fn from_engine(engine: UpdateEngine) -> Self {
        Self { engine }
    }

    /// The engine calls are routed to.
    #[must_use]
    pub fn engine(&self) -> &UpdateEngine {
        &self.engine
    }

    /// Host initialisation hook. Nothing to set up.
    #[must_use]
    pub fn init(&self) -> Response {
        tracing::debug!("init");
        Response::ok()
    }

    /// Resolves `function` to the operation it runs.
    ///
    /// # Errors
    /// `InvalidArgs` for an unknown name.
    pub fn resolve(&self, function: &str) -> RmaResult<OperationKind> {
        let function: Function = function.parse()?;
        Ok(function.route(self.engine.store().config().fe_location_routing))
    }

    /// Runs a call and returns the raw result.
    ///
    /// `query` yields the JSON array of records; every other function yields
    /// no payload.
    ///
    /// # Errors
    /// Any error of the routed operation.
    pub fn try_invoke<S: AsRef<str>>(
        &self,
        function: &str,
        args: &[S],
    ) -> RmaResult<Option<Vec<u8>>> {
        let kind = self.resolve(function)?;
        let command = Command::parse(kind, args)?;
        match self.engine.execute(command)? {
            Outcome::Written(_) => Ok(None),
            Outcome::Records(records) => {
                let bytes = serde_json::to_vec(&records).map_err(|e| {
                    RmaError::corrupt("query result", format!("cannot encode: {e}"))
                })?;
                Ok(Some(bytes))
            }
        }
    }

    /// Runs a call and reports it as a [`Response`].
    pub fn invoke<S: AsRef<str>>(&self, function: &str, args: &[S]) -> Response {
        self.try_invoke(function, args).into()
    }

    /// Runs an [`Invocation`] inside a span carrying its request id.
    pub fn handle(&self, invocation: &Invocation) -> Response {
        let span = tracing::info_span!(
            "invoke",
            request_id = %invocation.request_id,
            function = %invocation.function,
        );
        let _guard = span.enter();

        let response = self.invoke(&invocation.function, invocation.args.as_slice());
        if response.is_ok() {
            tracing::debug!(status = response.status, "invocation succeeded");
        } else {
            tracing::warn!(
                status = response.status,
                message = %response.message,
                "invocation failed"
            );
        }
        response
    }
}
