//! Solidity ABI of the two contracts involved.
//!
//! [`IGrader5`] is the observable interface of the deployed grader; every
//! call the driver makes to it goes through these definitions.
//! [`IReentrantAttacker`] is the driver's own surface, including its custom
//! errors and events.

use alloy_sol_types::sol;

sol! {
    /// Interface of the deployed grading contract.
    interface IGrader5 {
        function retrieve() external payable;
        function gradeMe(string calldata name) external;
        function counter(address account) external view returns (uint256);
        function isGraded(address account) external view returns (bool);
        function students(string calldata name) external view returns (uint256);
        function studentCounter() external view returns (uint256);
        function divisor() external view returns (uint256);
        function deadline() external view returns (uint256);
        function startTime() external view returns (uint256);
        function owner() external view returns (address);
        function setDivisor(uint256 newDivisor) external;
        function setWindow(uint256 newStart, uint256 newDeadline) external;
    }

    /// Constructor arguments of the local grader model.
    struct GraderParams {
        uint256 divisor;
        uint256 startTime;
        uint256 deadline;
        uint256 minValue;
        uint256 refund;
        uint256 attemptCap;
        uint256 threshold;
    }

    /// Constructor arguments of the attacker driver.
    struct AttackerParams {
        address target;
        uint256 minValue;
        uint256 threshold;
        uint256 attemptCap;
    }

    /// Surface of the reentrant attacker driver.
    interface IReentrantAttacker {
        function executeAttack() external payable;
        function registerStudent(string calldata name) external returns (uint256 grade);
        function attackAndRegister(string calldata name) external payable returns (uint256 grade);
        function withdraw() external;
        function getAttackStatus() external view returns (
            uint8 state,
            uint256 counter,
            bool graded,
            uint256 balance,
            uint256 grade,
            uint256 reentries
        );
        function checkCounter() external view returns (uint256);
        function checkIfGraded() external view returns (bool);
        function checkStudentGrade(string calldata name) external view returns (uint256);
        function controller() external view returns (address);
        function target() external view returns (address);

        error Unauthorized(address caller);
        error InsufficientValue(uint256 sent, uint256 minimum);
        error AlreadyInProgress();
        error ThresholdNotMet(uint256 counter, uint256 required);
        error AlreadyRegistered(string name);
        error UpstreamUnavailable(address target);
        error UpstreamReverted(string reason);
        error EmptyName();
        error NothingToWithdraw();

        event AttackStarted(address indexed controller, uint256 value);
        event ReentryTriggered(uint256 depth, uint256 counter);
        event RegistrationSuccess(string name, uint256 grade);
        event Withdrawal(address indexed to, uint256 amount);
        event Deposit(address indexed from, uint256 amount);
    }
}
